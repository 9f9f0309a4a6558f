//! Parses one source file into a [`ParsedContent`]. Each file must be
//! structured as follows:
//!
//! 1. Initial front matter fence (a line containing only `---`)
//! 2. YAML front matter with `title`, `date`, and optionally `slug`, `tags`,
//!    `draft`, `description` and `template`
//! 3. Terminal front matter fence (`---`)
//! 4. Markdown body
//!
//! For example:
//!
//! ```md
//! ---
//! title: Hello, world!
//! date: 2021-04-16
//! tags: [greet]
//! ---
//! # Hello
//!
//! World
//! ```

use crate::content::{ContentKind, ParsedContent, Slug};
use crate::markdown::{self, Extensions};
use crate::resolve::{self, PathEscape};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

const FENCE: &str = "---";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// The front matter fields we understand. Values stay loosely typed here so
/// that a wrong type is reported against the field that has it, rather than
/// as a generic YAML error.
#[derive(Deserialize, Default)]
#[serde(default)]
struct Frontmatter {
    title: Option<Value>,
    date: Option<Value>,
    slug: Option<Value>,
    tags: Option<Value>,
    draft: Option<Value>,
    description: Option<Value>,
    template: Option<Value>,
}

/// Splits `input` into its YAML block and its body. A leading byte-order
/// mark is ignored, and the fences may carry trailing whitespace (including
/// `\r`).
pub fn split(input: &str) -> std::result::Result<(&str, &str), &'static str> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lines = input.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == FENCE => {
            let yaml_start = first.len();
            let mut offset = yaml_start;
            for line in lines {
                if line.trim_end() == FENCE {
                    return Ok((
                        &input[yaml_start..offset],
                        &input[offset + line.len()..],
                    ));
                }
                offset += line.len();
            }
            Err("missing closing `---` for the front matter block")
        }
        _ => Err("content must begin with a `---` front matter fence"),
    }
}

/// Parses the file at `source` (already read into `input`) as content of the
/// given `kind`, converting the body with `extensions`.
pub fn parse(
    source: &Path,
    kind: ContentKind,
    input: &str,
    extensions: &Extensions,
) -> Result<ParsedContent> {
    let (yaml, body) = split(input).map_err(|reason| Error::FrontMatter {
        path: source.to_owned(),
        reason: reason.to_owned(),
    })?;
    let frontmatter = parse_yaml(source, yaml)?;
    let v = Validator { source };

    let title = match frontmatter.title {
        None => {
            return Err(v.error(
                "title",
                "missing required field `title`",
                "add a line such as `title: My First Post` to the front matter",
            ))
        }
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_owned(),
        Some(_) => {
            return Err(v.error(
                "title",
                "field `title` must be a non-empty string",
                "quote the title, e.g. `title: \"My First Post\"`",
            ))
        }
    };

    let date = match frontmatter.date {
        None => {
            return Err(v.error(
                "date",
                "missing required field `date`",
                "add a line such as `date: 2025-01-31` to the front matter",
            ))
        }
        Some(value) => v.date(&value)?,
    };

    let explicit = match &frontmatter.slug {
        None | Some(Value::Null) => None,
        Some(value) => Some(scalar(value).ok_or_else(|| {
            v.error(
                "slug",
                "field `slug` must be a string",
                "write the slug as plain text, e.g. `slug: my-post`",
            )
        })?),
    };
    let slug = match explicit {
        Some(explicit) if !explicit.trim().is_empty() => {
            v.explicit_slug(explicit.trim().to_lowercase(), &title)?
        }
        _ => Slug::derive(&title).ok_or_else(|| {
            v.error(
                "slug",
                format!("could not derive a slug from the title `{}`", title),
                "add an explicit `slug: my-post` made of a-z, 0-9 and `-`",
            )
        })?,
    };

    let mut tags = match frontmatter.tags {
        None => Vec::new(),
        Some(value) => v.tags(value)?,
    };
    if kind == ContentKind::Page && !tags.is_empty() {
        tracing::warn!(
            path = %source.display(),
            "tags are only used on posts; ignoring them on this page"
        );
        tags.clear();
    }

    let draft = match frontmatter.draft {
        None => false,
        Some(value) => v.draft(&value)?,
    };

    let description = v
        .optional_string("description", frontmatter.description)?
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty());
    let template = v
        .optional_string("template", frontmatter.template)?
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty());

    Ok(ParsedContent {
        kind,
        title,
        date,
        slug,
        tags,
        draft,
        description,
        template,
        html: markdown::to_html(body, extensions),
        source: source.to_owned(),
    })
}

fn parse_yaml(source: &Path, yaml: &str) -> Result<Frontmatter> {
    let structural = |reason: String| Error::FrontMatter {
        path: source.to_owned(),
        reason,
    };
    let value: Value = if yaml.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(yaml)
            .map_err(|e| structural(format!("invalid YAML: {}", e)))?
    };
    match value {
        Value::Null => Ok(Frontmatter::default()),
        value @ Value::Mapping(_) => serde_yaml::from_value(value)
            .map_err(|e| structural(format!("invalid front matter: {}", e))),
        _ => Err(structural(String::from(
            "front matter must be a mapping of `key: value` lines",
        ))),
    }
}

/// Renders a YAML scalar as text; `None` for sequences, mappings and null.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Builds field-level errors for one source file.
struct Validator<'a> {
    source: &'a Path,
}

impl Validator<'_> {
    fn error(
        &self,
        field: &'static str,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Error {
        Error::Validation {
            path: self.source.to_owned(),
            field,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    fn date(&self, value: &Value) -> Result<NaiveDateTime> {
        let text = match value {
            Value::String(s) => s.trim(),
            _ => {
                return Err(self.error(
                    "date",
                    "field `date` must be a date such as 2025-01-31",
                    "write the date as `date: YYYY-MM-DD`",
                ))
            }
        };
        parse_date(text).ok_or_else(|| {
            self.error(
                "date",
                format!("invalid date `{}`", text),
                "use YYYY-MM-DD, optionally followed by HH:MM or HH:MM:SS",
            )
        })
    }

    fn explicit_slug(&self, slug: String, title: &str) -> Result<Slug> {
        if let Err(source) = resolve::check_segment(&slug) {
            return Err(Error::PathEscape {
                path: self.source.to_owned(),
                source,
            });
        }
        Slug::new(&slug).ok_or_else(|| {
            let suggestion = match Slug::derive(&slug).or_else(|| Slug::derive(title)) {
                Some(s) => format!("use `slug: {}`", s),
                None => String::from("use only a-z, 0-9 and `-`"),
            };
            self.error(
                "slug",
                format!("slug `{}` may only contain a-z, 0-9 and `-`", slug),
                suggestion,
            )
        })
    }

    fn tags(&self, value: Value) -> Result<Vec<String>> {
        let items = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Sequence(items) => items,
            _ => {
                return Err(self.error(
                    "tags",
                    "field `tags` must be a list",
                    "write tags as `tags: [rust, web]`",
                ))
            }
        };
        let mut tags: Vec<String> = Vec::with_capacity(items.len());
        for item in &items {
            let tag = scalar(item).ok_or_else(|| {
                self.error(
                    "tags",
                    "each tag must be a plain word or phrase",
                    "write tags as `tags: [rust, web]`",
                )
            })?;
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Accepts YAML booleans, the strings `true/false/yes/no/on/off/1/0` in
    /// any case, and the integers 0 and 1.
    fn draft(&self, value: &Value) -> Result<bool> {
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.ok_or_else(|| {
            self.error(
                "draft",
                "field `draft` must be a boolean",
                "write `draft: true` or `draft: false`",
            )
        })
    }

    fn optional_string(
        &self,
        field: &'static str,
        value: Option<Value>,
    ) -> Result<Option<String>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.error(
                field,
                format!("field `{}` must be a string", field),
                format!("quote the value, e.g. `{}: \"...\"`", field),
            )),
        }
    }
}

/// Parses a front matter date: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, or
/// RFC 3339 (kept in its own local time).
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in DATE_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.naive_local())
}

pub type Result<T> = std::result::Result<T, Error>;

/// A problem with one source file. These are collected per file during
/// discovery rather than aborting it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the front matter block is missing, unterminated, or
    /// isn't a YAML mapping.
    #[error("{}: {reason}", .path.display())]
    FrontMatter { path: PathBuf, reason: String },

    /// Returned when a field is missing or invalid.
    #[error("{}: {message} ({suggestion})", .path.display())]
    Validation {
        path: PathBuf,
        field: &'static str,
        message: String,
        suggestion: String,
    },

    /// Returned when an explicit slug would escape the output directory.
    #[error("{}: slug {source}", .path.display())]
    PathEscape {
        path: PathBuf,
        #[source]
        source: PathEscape,
    },

    /// Returned when the file can't be read.
    #[error("reading `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

impl Error {
    /// The source file the error is about.
    pub fn path(&self) -> &Path {
        match self {
            Error::FrontMatter { path, .. }
            | Error::Validation { path, .. }
            | Error::PathEscape { path, .. }
            | Error::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn post(input: &str) -> Result<ParsedContent> {
        parse(
            Path::new("content/posts/p.md"),
            ContentKind::Post,
            input,
            &Extensions::default(),
        )
    }

    fn validation_field(input: &str) -> &'static str {
        match post(input) {
            Err(Error::Validation { field, .. }) => field,
            Err(e) => panic!("expected a validation error, got {}", e),
            Ok(_) => panic!("expected a validation error"),
        }
    }

    #[test]
    fn test_split() {
        assert_eq!(Ok(("a: 1\n", "body\n")), split("---\na: 1\n---\nbody\n"));
        assert_eq!(Ok(("", "")), split("---\n---"));
        assert_eq!(Ok(("a: 1\r\n", "x")), split("\u{feff}---\r\na: 1\r\n---\r\nx"));
        assert!(split("a: 1\n---\n").is_err());
        assert!(split("---\na: 1\n").is_err());
        assert!(split("---").is_err());
    }

    #[test]
    fn test_dashes_inside_values_are_not_fences() -> Result<()> {
        let parsed = post("---\ntitle: a---b\ndate: 2025-01-01\n---\nbody")?;
        assert_eq!("a---b", parsed.title);
        Ok(())
    }

    #[test]
    fn test_parse_full() -> Result<()> {
        let parsed = post(
            "---
title: '  Hello, World!  '
date: 2025-01-02
tags: [Rust, ' web ', rust]
draft: false
description: A greeting
---
# Hi

Body text.
",
        )?;
        assert_eq!(ContentKind::Post, parsed.kind);
        assert_eq!("Hello, World!", parsed.title);
        assert_eq!("2025-01-02", parsed.date_string());
        assert_eq!("hello-world", parsed.slug.as_str());
        assert_eq!(vec!["rust".to_owned(), "web".to_owned()], parsed.tags);
        assert!(!parsed.draft);
        assert_eq!(Some("A greeting".to_owned()), parsed.description);
        assert_eq!("<h1>Hi</h1>\n<p>Body text.</p>\n", parsed.html);
        assert_eq!(Path::new("content/posts/p.md"), parsed.source);
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let parsed = post("---\ntitle: T\ndate: 2025-01-01\n---\n")?;
        assert!(parsed.tags.is_empty());
        assert!(!parsed.draft);
        assert_eq!(None, parsed.description);
        assert_eq!(None, parsed.template);
        Ok(())
    }

    #[test]
    fn test_explicit_slug_is_kept() -> Result<()> {
        let parsed = post("---\ntitle: T\ndate: 2025-01-01\nslug: my-post-1\n---\n")?;
        assert_eq!("my-post-1", parsed.slug.as_str());

        let parsed = post("---\ntitle: T\ndate: 2025-01-01\nslug: '  My-Post '\n---\n")?;
        assert_eq!("my-post", parsed.slug.as_str());
        Ok(())
    }

    #[test]
    fn test_noncompliant_slug_is_rejected() {
        assert_eq!(
            "slug",
            validation_field("---\ntitle: T\ndate: 2025-01-01\nslug: hello world\n---\n")
        );
    }

    #[test]
    fn test_non_scalar_slug_is_rejected() {
        for slug in &["[a]", "{x: 1}"] {
            let input = format!("---\ntitle: T\ndate: 2025-01-01\nslug: {}\n---\n", slug);
            assert_eq!("slug", validation_field(&input), "{}", slug);
        }
    }

    #[test]
    fn test_null_slug_is_derived() -> Result<()> {
        let parsed = post("---\ntitle: Hello\ndate: 2025-01-01\nslug:\n---\n")?;
        assert_eq!("hello", parsed.slug.as_str());
        Ok(())
    }

    #[test]
    fn test_traversal_slug_is_a_path_escape() {
        for slug in &["../../etc", "%2e%2e", "a/b"] {
            let input = format!("---\ntitle: T\ndate: 2025-01-01\nslug: '{}'\n---\n", slug);
            match post(&input) {
                Err(Error::PathEscape { path, .. }) => {
                    assert_eq!(Path::new("content/posts/p.md"), path)
                }
                other => panic!("{}: expected PathEscape, got {:?}", slug, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_underivable_slug() {
        assert_eq!("slug", validation_field("---\ntitle: '!!!'\ndate: 2025-01-01\n---\n"));
    }

    #[test]
    fn test_missing_fields() {
        match post("---\ndate: 2025-01-01\n---\n") {
            Err(Error::Validation {
                path,
                field,
                suggestion,
                ..
            }) => {
                assert_eq!(Path::new("content/posts/p.md"), path);
                assert_eq!("title", field);
                assert!(suggestion.contains("title:"));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!("date", validation_field("---\ntitle: T\n---\n"));
        assert_eq!("title", validation_field("---\n---\nbody"));
        assert_eq!("title", validation_field("---\ntitle: '   '\ndate: 2025-01-01\n---\n"));
    }

    #[test]
    fn test_invalid_date_fails() {
        assert_eq!("date", validation_field("---\ntitle: T\ndate: yesterday\n---\n"));
        assert_eq!("date", validation_field("---\ntitle: T\ndate: 2025-02-30\n---\n"));
        assert_eq!("date", validation_field("---\ntitle: T\ndate: 20250101\n---\n"));
    }

    #[test]
    fn test_date_formats() {
        let at = |h, m, s| {
            NaiveDate::from_ymd_opt(2025, 10, 17)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap()
        };
        assert_eq!(Some(at(0, 0, 0)), parse_date("2025-10-17"));
        assert_eq!(Some(at(10, 30, 0)), parse_date("2025-10-17 10:30"));
        assert_eq!(Some(at(10, 30, 5)), parse_date("2025-10-17 10:30:05"));
        assert_eq!(Some(at(10, 30, 5)), parse_date("2025-10-17T10:30:05+02:00"));
        assert_eq!(None, parse_date("17/10/2025"));
    }

    #[test]
    fn test_draft_coercion() -> Result<()> {
        for (raw, wanted) in &[
            ("true", true),
            ("false", false),
            ("'yes'", true),
            ("'No'", false),
            ("'on'", true),
            ("1", true),
            ("0", false),
        ] {
            let parsed = post(&format!("---\ntitle: T\ndate: 2025-01-01\ndraft: {}\n---\n", raw))?;
            assert_eq!(*wanted, parsed.draft, "{}", raw);
        }
        assert_eq!("draft", validation_field("---\ntitle: T\ndate: 2025-01-01\ndraft: maybe\n---\n"));
        assert_eq!("draft", validation_field("---\ntitle: T\ndate: 2025-01-01\ndraft: 2\n---\n"));
        Ok(())
    }

    #[test]
    fn test_tags_must_be_a_list() {
        assert_eq!("tags", validation_field("---\ntitle: T\ndate: 2025-01-01\ntags: rust\n---\n"));
        assert_eq!("tags", validation_field("---\ntitle: T\ndate: 2025-01-01\ntags: [[a]]\n---\n"));
    }

    #[test]
    fn test_structural_errors() {
        for input in &[
            "no front matter",
            "---\ntitle: T\n",
            "---\ntitle: [unclosed\n---\n",
            "---\n- a\n- b\n---\n",
        ] {
            match post(input) {
                Err(Error::FrontMatter { path, .. }) => {
                    assert_eq!(Path::new("content/posts/p.md"), path)
                }
                other => panic!("{:?}: got {:?}", input, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_page_tags_are_ignored() -> Result<()> {
        let parsed = parse(
            Path::new("content/pages/about.md"),
            ContentKind::Page,
            "---\ntitle: About\ndate: 2025-01-01\ntags: [a]\ntemplate: wide.html\n---\n",
            &Extensions::default(),
        )?;
        assert!(parsed.tags.is_empty());
        assert_eq!(Some("wide.html".to_owned()), parsed.template);
        Ok(())
    }
}
