//! Finds every post and page source file beneath the project's content
//! directories and parses each one. A file that fails to parse becomes a
//! [`Diagnostic`]; it never stops discovery of the others.

use crate::content::{ContentKind, ParsedContent};
use crate::frontmatter::{self, Error as ParseError};
use crate::markdown::Extensions;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["md", "markdown"];

/// A per-file failure collected during discovery.
#[derive(Debug)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub error: ParseError,
}

/// Everything found beneath the content directories.
#[derive(Debug, Default)]
pub struct Discovered {
    /// Parsed posts, in walk order.
    pub posts: Vec<ParsedContent>,

    /// Parsed pages, in walk order.
    pub pages: Vec<ParsedContent>,

    /// Failures, sorted by source path.
    pub diagnostics: Vec<Diagnostic>,

    /// The number of content files that were found, parsed or not.
    pub attempted: usize,
}

/// Walks `posts_dir` and `pages_dir`, parses every Markdown file, and checks
/// that slugs are unique within each kind. Missing directories contribute
/// nothing.
pub fn discover(
    posts_dir: &Path,
    pages_dir: &Path,
    extensions: &Extensions,
) -> Result<Discovered> {
    let mut discovered = Discovered::default();
    for (dir, kind) in &[(posts_dir, ContentKind::Post), (pages_dir, ContentKind::Page)] {
        for path in source_files(dir, &mut discovered.diagnostics) {
            discovered.attempted += 1;
            tracing::debug!(path = %path.display(), %kind, "parsing");
            match parse_file(&path, *kind, extensions) {
                Ok(content) => match kind {
                    ContentKind::Post => discovered.posts.push(content),
                    ContentKind::Page => discovered.pages.push(content),
                },
                Err(error) => discovered.diagnostics.push(Diagnostic { path, error }),
            }
        }
    }
    discovered
        .diagnostics
        .sort_by(|a, b| a.path.cmp(&b.path));

    check_unique(&discovered.posts)?;
    check_unique(&discovered.pages)?;
    Ok(discovered)
}

fn parse_file(
    path: &Path,
    kind: ContentKind,
    extensions: &Extensions,
) -> frontmatter::Result<ParsedContent> {
    let input = std::fs::read_to_string(path).map_err(|err| ParseError::Io {
        path: path.to_owned(),
        err,
    })?;
    frontmatter::parse(path, kind, &input, extensions)
}

/// Lists the Markdown files beneath `dir` sorted by file name. Entries the
/// walk can't read are recorded as diagnostics.
fn source_files(dir: &Path, diagnostics: &mut Vec<Diagnostic>) -> Vec<PathBuf> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "content directory not found; skipping");
        return Vec::new();
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                let wanted = entry.file_type().is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map_or(false, |ext| EXTENSIONS.contains(&ext));
                if wanted {
                    files.push(path.to_owned());
                }
            }
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_owned();
                let err = match err.into_io_error() {
                    Some(err) => err,
                    None => std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "filesystem loop detected",
                    ),
                };
                diagnostics.push(Diagnostic {
                    path: path.clone(),
                    error: ParseError::Io { path, err },
                });
            }
        }
    }
    files
}

fn check_unique(items: &[ParsedContent]) -> Result<()> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for item in items {
        if let Some(first) = seen.insert(item.slug.as_str(), &item.source) {
            return Err(SlugCollision {
                kind: item.kind,
                slug: item.slug.to_string(),
                first: first.to_owned(),
                second: item.source.clone(),
            });
        }
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, SlugCollision>;

/// Returned when two items of the same kind resolve to the same slug.
#[derive(Debug, thiserror::Error)]
#[error(
    "{kind}s `{}` and `{}` both use the slug `{slug}`",
    .first.display(),
    .second.display()
)]
pub struct SlugCollision {
    pub kind: ContentKind,
    pub slug: String,
    pub first: PathBuf,
    pub second: PathBuf,
}
