//! Defines the [`SiteConfig`] type (the validated contents of `config.yaml`)
//! and the [`Project`] type, which knows where a project's sources live.
//!
//! A minimal configuration looks like this:
//!
//! ```yaml
//! site_name: My Blog
//! base_url: https://example.org/
//! author: Jane Doe
//! ```
//!
//! Optional fields are `timezone` (IANA name, default `UTC`),
//! `posts_per_page` (default 10), `output_dir` (default `site`),
//! `description`, `keywords`, `markdown_extensions`, `feed_limit` and
//! `static_dir` (default `static`).

use crate::markdown::{Extensions, UnknownExtension};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// The name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Deserialize)]
struct PostsPerPage(i64);

impl Default for PostsPerPage {
    fn default() -> Self {
        PostsPerPage(10)
    }
}

/// The configuration file exactly as written. Nothing outside this module
/// sees it; it's validated into a [`SiteConfig`] immediately.
#[derive(Deserialize)]
struct RawConfig {
    site_name: Option<String>,
    base_url: Option<String>,
    author: Option<String>,

    #[serde(default)]
    timezone: Option<String>,

    #[serde(default)]
    posts_per_page: PostsPerPage,

    #[serde(default)]
    output_dir: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    keywords: Vec<String>,

    #[serde(default)]
    markdown_extensions: Option<Vec<String>>,

    #[serde(default)]
    feed_limit: Option<i64>,

    #[serde(default)]
    static_dir: Option<String>,
}

/// Validated site-wide settings. The only way to get one is through
/// [`SiteConfig::from_yaml`] or [`SiteConfig::load`], so holding a
/// `SiteConfig` means every field passed validation.
#[derive(Clone, Debug)]
pub struct SiteConfig {
    site_name: String,
    base_url: Url,
    author: String,
    timezone: Tz,
    posts_per_page: usize,
    output_dir: PathBuf,
    description: Option<String>,
    keywords: Vec<String>,
    markdown_extensions: Extensions,
    feed_limit: Option<usize>,
    static_dir: PathBuf,
}

impl SiteConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<SiteConfig> {
        let input = std::fs::read_to_string(path).map_err(|err| Error::Read {
            path: path.to_owned(),
            err,
        })?;
        SiteConfig::from_yaml(&input, path)
    }

    /// Parses and validates configuration from YAML text. `origin` is the
    /// file the text came from and is only used in error messages.
    pub fn from_yaml(input: &str, origin: &Path) -> Result<SiteConfig> {
        let raw: RawConfig = match serde_yaml::from_str(input) {
            Ok(raw) => raw,
            Err(err) => {
                return Err(Error::Yaml {
                    path: origin.to_owned(),
                    err,
                })
            }
        };
        let invalid = |field: &'static str, reason: String| Error::Invalid {
            path: origin.to_owned(),
            field,
            reason,
        };

        let site_name = required(raw.site_name, "site_name", origin)?;
        let author = required(raw.author, "author", origin)?;
        let base_url = parse_base_url(&required(raw.base_url, "base_url", origin)?)
            .map_err(|reason| invalid("base_url", reason))?;

        let timezone_name = raw.timezone.unwrap_or_else(|| String::from("UTC"));
        let timezone: Tz = timezone_name.trim().parse().map_err(|_| {
            invalid(
                "timezone",
                format!(
                    "`{}` is not an IANA time zone name (e.g. `UTC`, \
                     `Europe/Paris`)",
                    timezone_name
                ),
            )
        })?;

        let posts_per_page = match raw.posts_per_page.0 {
            n if n > 0 => n as usize,
            n => {
                return Err(invalid(
                    "posts_per_page",
                    format!("must be a positive integer, got {}", n),
                ))
            }
        };

        let feed_limit = match raw.feed_limit {
            None => None,
            Some(n) if n > 0 => Some(n as usize),
            Some(n) => {
                return Err(invalid(
                    "feed_limit",
                    format!("must be a positive integer, got {}", n),
                ))
            }
        };

        let output_dir = relative_dir(raw.output_dir.as_deref().unwrap_or("site"))
            .map_err(|reason| invalid("output_dir", reason))?;
        let static_dir = relative_dir(raw.static_dir.as_deref().unwrap_or("static"))
            .map_err(|reason| invalid("static_dir", reason))?;

        let markdown_extensions = match &raw.markdown_extensions {
            None => Extensions::default(),
            Some(names) => Extensions::from_names(names.as_slice())
                .map_err(|err: UnknownExtension| {
                    invalid("markdown_extensions", err.to_string())
                })?,
        };

        Ok(SiteConfig {
            site_name,
            base_url,
            author,
            timezone,
            posts_per_page,
            output_dir,
            description: raw
                .description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
            keywords: raw
                .keywords
                .into_iter()
                .map(|k| k.trim().to_owned())
                .filter(|k| !k.is_empty())
                .collect(),
            markdown_extensions,
            feed_limit,
            static_dir,
        })
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// The site's absolute base URL. Always ends in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn posts_per_page(&self) -> usize {
        self.posts_per_page
    }

    /// The output directory, relative to the project root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn markdown_extensions(&self) -> &Extensions {
        &self.markdown_extensions
    }

    /// The maximum number of posts in the feed; `None` means all of them.
    pub fn feed_limit(&self) -> Option<usize> {
        self.feed_limit
    }

    /// Where static assets are copied, relative to the output directory.
    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    origin: &Path,
) -> Result<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(Error::Invalid {
            path: origin.to_owned(),
            field,
            reason: String::from("must not be empty"),
        }),
        None => Err(Error::Missing {
            path: origin.to_owned(),
            field,
        }),
    }
}

fn parse_base_url(value: &str) -> std::result::Result<Url, String> {
    let mut url = Url::parse(value)
        .map_err(|e| format!("`{}` is not an absolute URL: {}", value, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!(
            "`{}` must use the http or https scheme",
            value
        ));
    }
    if url.host_str().is_none() {
        return Err(format!("`{}` has no host", value));
    }
    url.set_query(None);
    url.set_fragment(None);

    // A trailing slash is significant to [`Url::join`]; without it the last
    // path segment is treated as a file name and dropped.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Accepts only plain relative paths (no `..`, no root, no `.` alone) so the
/// directory can't be the project root or lie outside it.
fn relative_dir(value: &str) -> std::result::Result<PathBuf, String> {
    let path = Path::new(value.trim());
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => {
                return Err(format!(
                    "`{}` must be a relative path inside the project",
                    value
                ))
            }
        }
    }
    if normal == 0 {
        return Err(format!("`{}` must name a subdirectory", value));
    }
    Ok(path.to_owned())
}

/// The location of a project's sources. Every path is derived from the
/// project root:
///
/// ```text
/// <root>/config.yaml
/// <root>/content/posts/
/// <root>/content/pages/
/// <root>/templates/
/// <root>/static/
/// ```
#[derive(Clone, Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub posts_source_directory: PathBuf,
    pub pages_source_directory: PathBuf,
    pub templates_directory: PathBuf,
    pub static_source_directory: PathBuf,
}

impl Project {
    /// Describes the project rooted at `root`. Nothing is read from disk.
    pub fn at(root: &Path) -> Project {
        let content = root.join("content");
        Project {
            root: root.to_owned(),
            config_file: root.join(CONFIG_FILE),
            posts_source_directory: content.join("posts"),
            pages_source_directory: content.join("pages"),
            templates_directory: root.join("templates"),
            static_source_directory: root.join("static"),
        }
    }

    /// Finds the project containing `dir` by searching `dir` and then each
    /// of its ancestors for a [`CONFIG_FILE`].
    pub fn locate(dir: &Path) -> Result<Project> {
        dir.ancestors()
            .find(|candidate| candidate.join(CONFIG_FILE).is_file())
            .map(Project::at)
            .ok_or_else(|| Error::NotFound(dir.to_owned()))
    }

    /// Every directory a build reads from.
    pub fn source_directories(&self) -> [&Path; 4] {
        [
            self.posts_source_directory.as_path(),
            self.pages_source_directory.as_path(),
            self.templates_directory.as_path(),
            self.static_source_directory.as_path(),
        ]
    }

    pub fn load_config(&self) -> Result<SiteConfig> {
        SiteConfig::load(&self.config_file)
    }

    /// The absolute (or root-relative) output directory for `config`.
    pub fn output_directory(&self, config: &SiteConfig) -> PathBuf {
        self.root.join(config.output_dir())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A configuration problem. All of these are fatal to a build.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when no project root could be found.
    #[error(
        "could not find `{}` in `{}` or any parent directory",
        CONFIG_FILE,
        .0.display()
    )]
    NotFound(PathBuf),

    /// Returned when the configuration file can't be read.
    #[error("reading configuration `{}`: {err}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when the configuration file isn't valid YAML or a field has
    /// the wrong type.
    #[error("parsing configuration `{}`: {err}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },

    /// Returned when a required field is absent.
    #[error(
        "configuration `{}`: missing required field `{field}`",
        .path.display()
    )]
    Missing { path: PathBuf, field: &'static str },

    /// Returned when a field is present but invalid.
    #[error("configuration `{}`: field `{field}` {reason}", .path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL: &str = "\
site_name: T
base_url: https://e.com
author: A
";

    fn parse(input: &str) -> Result<SiteConfig> {
        SiteConfig::from_yaml(input, Path::new("config.yaml"))
    }

    fn invalid_field(input: &str) -> &'static str {
        match parse(input) {
            Err(Error::Invalid { field, .. }) => field,
            Err(Error::Missing { field, .. }) => field,
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = parse(MINIMAL)?;
        assert_eq!("T", config.site_name());
        assert_eq!("https://e.com/", config.base_url().as_str());
        assert_eq!("A", config.author());
        assert_eq!(Tz::UTC, config.timezone());
        assert_eq!(10, config.posts_per_page());
        assert_eq!(Path::new("site"), config.output_dir());
        assert_eq!(Path::new("static"), config.static_dir());
        assert_eq!(None, config.description());
        assert!(config.keywords().is_empty());
        assert_eq!(None, config.feed_limit());
        assert_eq!(&Extensions::default(), config.markdown_extensions());
        Ok(())
    }

    #[test]
    fn test_full() -> Result<()> {
        let config = parse(
            "\
site_name: T
base_url: https://e.com/blog
author: A
timezone: Europe/Paris
posts_per_page: 1
output_dir: public
description: '  Notes  '
keywords: [rust, ' web ']
markdown_extensions: [tables]
feed_limit: 20
static_dir: assets
",
        )?;
        assert_eq!("https://e.com/blog/", config.base_url().as_str());
        assert_eq!(chrono_tz::Europe::Paris, config.timezone());
        assert_eq!(1, config.posts_per_page());
        assert_eq!(Path::new("public"), config.output_dir());
        assert_eq!(Some("Notes"), config.description());
        assert_eq!(&["rust".to_owned(), "web".to_owned()], config.keywords());
        assert_eq!(Some(20), config.feed_limit());
        assert_eq!(Path::new("assets"), config.static_dir());
        Ok(())
    }

    #[test]
    fn test_missing_required_fields() {
        assert_eq!("site_name", invalid_field("base_url: https://e.com\nauthor: A\n"));
        assert_eq!("author", invalid_field("site_name: T\nbase_url: https://e.com\n"));
        assert_eq!("base_url", invalid_field("site_name: T\nauthor: A\n"));
        assert_eq!(
            "site_name",
            invalid_field("site_name: '  '\nbase_url: https://e.com\nauthor: A\n")
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert_eq!("base_url", invalid_field("site_name: T\nbase_url: /blog\nauthor: A\n"));
        assert_eq!(
            "base_url",
            invalid_field("site_name: T\nbase_url: ftp://e.com\nauthor: A\n")
        );
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(
            "posts_per_page",
            invalid_field(&format!("{}posts_per_page: 0\n", MINIMAL))
        );
        assert_eq!(
            "posts_per_page",
            invalid_field(&format!("{}posts_per_page: -3\n", MINIMAL))
        );
        assert_eq!(
            "feed_limit",
            invalid_field(&format!("{}feed_limit: 0\n", MINIMAL))
        );
    }

    #[test]
    fn test_non_integer_page_size_is_a_yaml_error() {
        match parse(&format!("{}posts_per_page: ten\n", MINIMAL)) {
            Err(Error::Yaml { .. }) => {}
            other => panic!("expected a YAML error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_timezone() {
        assert_eq!(
            "timezone",
            invalid_field(&format!("{}timezone: Mars/Olympus\n", MINIMAL))
        );
    }

    #[test]
    fn test_output_dir_must_stay_inside_project() {
        for dir in &["..", "../site", "/tmp/site", ".", "a/../../b"] {
            assert_eq!(
                "output_dir",
                invalid_field(&format!("{}output_dir: '{}'\n", MINIMAL, dir)),
                "{}",
                dir
            );
        }
    }

    #[test]
    fn test_unknown_markdown_extension() {
        assert_eq!(
            "markdown_extensions",
            invalid_field(&format!("{}markdown_extensions: [wiki]\n", MINIMAL))
        );
    }

    #[test]
    fn test_locate_walks_up() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(CONFIG_FILE), MINIMAL)?;
        let nested = dir.path().join("content").join("posts");
        std::fs::create_dir_all(&nested)?;

        let project = Project::locate(&nested)?;
        assert_eq!(dir.path(), project.root);
        assert_eq!(dir.path().join("content/posts"), project.posts_source_directory);
        assert_eq!("T", project.load_config()?.site_name());
        Ok(())
    }
}
