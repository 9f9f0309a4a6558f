//! Defines [`ParsedContent`], the in-memory form of one post or page, along
//! with [`ContentKind`] and the URL-safe [`Slug`] token.

use chrono::NaiveDateTime;
use std::fmt;
use std::path::PathBuf;

/// Whether a content item is a dated blog post or a standalone page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentKind {
    Post,
    Page,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ContentKind::Post => "post",
            ContentKind::Page => "page",
        })
    }
}

/// A non-empty token made only of `a-z`, `0-9` and `-`. Slugs name output
/// directories, so a `Slug` can never contain a path separator or a dot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slug(String);

impl Slug {
    /// Accepts `value` only if it is already a valid slug.
    pub fn new(value: &str) -> Option<Slug> {
        if !value.is_empty()
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            Some(Slug(value.to_owned()))
        } else {
            None
        }
    }

    /// Derives a slug from free text: lowercased, transliterated to ASCII,
    /// runs of anything else collapsed to single hyphens, and leading and
    /// trailing hyphens trimmed. Returns `None` if nothing survives (e.g. a
    /// title made only of punctuation).
    pub fn derive(text: &str) -> Option<Slug> {
        Slug::new(&slug::slugify(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Marks the end of a post's summary. Everything before the marker is shown
/// on index pages and used as the feed excerpt.
pub const FOLD_TAG: &str = "<!-- more -->";

/// One parsed and validated post or page.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedContent {
    pub kind: ContentKind,

    /// The trimmed, non-empty title.
    pub title: String,

    /// The publication date. The time of day is midnight unless the front
    /// matter gave one.
    pub date: NaiveDateTime,

    pub slug: Slug,

    /// Trimmed, lowercased and deduplicated, in the order they were written.
    /// Always empty for pages.
    pub tags: Vec<String>,

    pub draft: bool,

    pub description: Option<String>,

    /// A page's template override (e.g. `about.html`), if it named one.
    pub template: Option<String>,

    /// The body, already converted from Markdown.
    pub html: String,

    /// The source file, for diagnostics.
    pub source: PathBuf,
}

impl ParsedContent {
    /// Returns the HTML before the [`FOLD_TAG`] and whether the body was
    /// actually folded. Without a marker the summary is the whole body.
    pub fn summary(&self) -> (&str, bool) {
        match self.html.find(FOLD_TAG) {
            Some(i) => (&self.html[..i], true),
            None => (&self.html, false),
        }
    }

    /// The date as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}
