//! Maps content to public URLs and output file paths. Everything here is pure
//! string and path arithmetic; nothing touches the filesystem.
//!
//! | Item           | URL              | File                          |
//! |----------------|------------------|-------------------------------|
//! | post           | `/posts/<slug>/` | `<root>/posts/<slug>/index.html` |
//! | page           | `/<slug>/`       | `<root>/<slug>/index.html`     |
//! | tag archive    | `/tag/<tag>/`    | `<root>/tag/<tag>/index.html`  |
//! | index page 1   | `/`              | `<root>/index.html`            |
//! | index page N≥2 | `/page/<N>/`     | `<root>/page/<N>/index.html`   |
//! | feed           | `/feed.xml`      | `<root>/feed.xml`              |
//!
//! URL segments are percent-encoded; file segments use the raw value. Every
//! value that becomes a path segment is checked by [`check_segment`] first,
//! and every joined path is checked to still live under the output root.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Everything except unreserved characters (`A-Z a-z 0-9 - _ . ~`) is
/// escaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const INDEX_FILE: &str = "index.html";

const SEPARATORS: &[char] = &['/', '\\', '\0'];

/// The feed's file name at the output root.
pub const FEED_FILE: &str = "feed.xml";

/// Where an item is published and where its file is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// The root-relative URL, e.g. `/posts/hello/`.
    pub url: String,

    /// The output file, e.g. `site/posts/hello/index.html`.
    pub path: PathBuf,
}

/// Resolves [`Target`]s beneath one output root.
pub struct Resolver<'a> {
    root: &'a Path,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a Path) -> Resolver<'a> {
        Resolver { root }
    }

    pub fn root(&self) -> &Path {
        self.root
    }

    pub fn post(&self, slug: &str) -> Result<Target> {
        self.directory(&["posts"], slug)
    }

    pub fn page(&self, slug: &str) -> Result<Target> {
        self.directory(&[], slug)
    }

    pub fn tag(&self, tag: &str) -> Result<Target> {
        self.directory(&["tag"], tag)
    }

    /// The `number`th (1-based) index page. Page 1 is the site root; `0` is
    /// treated as 1.
    pub fn index(&self, number: usize) -> Target {
        match number {
            0 | 1 => Target {
                url: String::from("/"),
                path: self.root.join(INDEX_FILE),
            },
            n => Target {
                url: format!("/page/{}/", n),
                path: self.root.join("page").join(n.to_string()).join(INDEX_FILE),
            },
        }
    }

    pub fn feed(&self) -> Target {
        Target {
            url: format!("/{}", FEED_FILE),
            path: self.root.join(FEED_FILE),
        }
    }

    /// Builds `<root>/<prefix...>/<value>/index.html` and
    /// `/<prefix...>/<encoded value>/`.
    fn directory(&self, prefix: &[&str], value: &str) -> Result<Target> {
        check_segment(value)?;

        let mut path = self.root.to_path_buf();
        let mut url = String::from("/");
        for segment in prefix {
            path.push(segment);
            url.push_str(segment);
            url.push('/');
        }
        for component in Path::new(value).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => return Err(PathEscape::new(value)),
            }
        }
        path.push(INDEX_FILE);
        if !contained(self.root, &path) {
            return Err(PathEscape::new(value));
        }

        url.extend(utf8_percent_encode(value, SEGMENT));
        url.push('/');
        Ok(Target { url, path })
    }
}

/// Rejects any value that could not safely be used as a single directory
/// name. The value is percent-decoded until it stops changing, so
/// `%2e%2e` and `%252e%252e` are caught the same way as `..`.
pub fn check_segment(value: &str) -> Result<()> {
    let decoded = decode_fully(value);
    let bad = decoded.is_empty()
        || decoded == "."
        || decoded == ".."
        || decoded.contains(SEPARATORS)
        || value.contains(SEPARATORS);
    if bad {
        Err(PathEscape::new(value))
    } else {
        Ok(())
    }
}

fn decode_fully(value: &str) -> String {
    let mut current = value.to_owned();
    loop {
        let next = percent_decode_str(&current).decode_utf8_lossy().into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Reports whether `path` is a strict descendant of `root` once both are
/// lexically normalized.
fn contained(root: &Path, path: &Path) -> bool {
    match (normalize(root), normalize(path)) {
        (Some(root), Some(path)) => path.starts_with(&root) && path != root,
        _ => false,
    }
}

/// Resolves `.` and `..` without consulting the filesystem. Returns `None`
/// if a `..` would climb above the start of the path.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    Some(normalized)
}

/// The root-relative URL of a directory beneath the output root, e.g.
/// `/static/` for `static`.
pub fn directory_url(dir: &Path) -> String {
    let mut url = String::from("/");
    for component in dir.components() {
        if let Component::Normal(part) = component {
            url.extend(utf8_percent_encode(&part.to_string_lossy(), SEGMENT));
            url.push('/');
        }
    }
    url
}

/// Joins a root-relative URL (as produced by [`Resolver`]) onto the site's
/// base URL, which always ends in `/`.
pub fn absolute(base_url: &Url, url: &str) -> String {
    format!("{}{}", base_url.as_str(), url.trim_start_matches('/'))
}

pub type Result<T> = std::result::Result<T, PathEscape>;

/// Returned when a slug or tag would resolve outside the output directory.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("`{value}` would resolve outside the output directory")]
pub struct PathEscape {
    pub value: String,
}

impl PathEscape {
    fn new(value: &str) -> PathEscape {
        PathEscape {
            value: value.to_owned(),
        }
    }
}
