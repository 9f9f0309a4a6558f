//! Exports [`Build`] (and the [`build_site`] shorthand), which stitches
//! together the high-level steps of building the output static site: loading
//! the configuration ([`crate::config`]), discovering and parsing content
//! ([`crate::discover`]), aggregating posts ([`crate::aggregate`]), cleaning
//! the output root, rendering pages ([`crate::write`]) and the RSS feed
//! ([`crate::feed`]), and copying the static assets into the output root.

use crate::aggregate::Aggregate;
use crate::config::{self, Project, SiteConfig, CONFIG_FILE};
use crate::discover::{self, Diagnostic, SlugCollision};
use crate::feed;
use crate::frontmatter::Error as ParseError;
use crate::resolve::{PathEscape, Resolver};
use crate::template::{GtmplRenderer, Renderer, TemplateError};
use crate::write::{self, write_file, Writer};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Where a [`Build`] has got to. `Failed` can follow any other stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    ConfigLoaded,
    ContentDiscovered,
    Aggregated,
    Rendering,
    AssetsCopied,
    Complete,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::NotStarted => "not started",
            Stage::ConfigLoaded => "configuration loaded",
            Stage::ContentDiscovered => "content discovered",
            Stage::Aggregated => "posts aggregated",
            Stage::Rendering => "rendering",
            Stage::AssetsCopied => "assets copied",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Preview mode: publish drafts as well.
    pub include_drafts: bool,

    /// Fail the build if any content file failed to parse.
    pub strict: bool,
}

/// What a successful build produced.
#[derive(Debug)]
pub struct BuildReport {
    pub posts: usize,
    pub pages: usize,
    pub tags: usize,
    pub index_pages: usize,
    pub assets: usize,

    /// The output root that was written.
    pub output_dir: PathBuf,

    /// Files that were skipped, sorted by path.
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds one project. A `Build` runs once; [`Build::stage`] reports how far
/// it got.
pub struct Build {
    project: Project,
    options: BuildOptions,
    stage: Stage,
}

impl Build {
    pub fn new(project: Project, options: BuildOptions) -> Build {
        Build {
            project,
            options,
            stage: Stage::NotStarted,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the build with the templates in the project's `templates/`
    /// directory.
    pub fn run(&mut self) -> Result<BuildReport> {
        let result = self.load_config().and_then(|config| {
            let renderer = GtmplRenderer::load(&self.project.templates_directory)?;
            self.execute(&config, &renderer)
        });
        self.finish(result)
    }

    /// Runs the build with a caller-supplied renderer.
    pub fn run_with(&mut self, renderer: &dyn Renderer) -> Result<BuildReport> {
        let result = self
            .load_config()
            .and_then(|config| self.execute(&config, renderer));
        self.finish(result)
    }

    fn advance(&mut self, stage: Stage) {
        tracing::info!(from = %self.stage, to = %stage, "build stage");
        self.stage = stage;
    }

    fn finish(&mut self, result: Result<BuildReport>) -> Result<BuildReport> {
        match &result {
            Ok(_) => self.advance(Stage::Complete),
            Err(err) => {
                tracing::error!(stage = %self.stage, "build failed: {}", err);
                self.advance(Stage::Failed);
            }
        }
        result
    }

    fn load_config(&mut self) -> Result<SiteConfig> {
        let config = self.project.load_config()?;
        self.advance(Stage::ConfigLoaded);
        Ok(config)
    }

    fn execute(&mut self, config: &SiteConfig, renderer: &dyn Renderer) -> Result<BuildReport> {
        let mut discovered = discover::discover(
            &self.project.posts_source_directory,
            &self.project.pages_source_directory,
            config.markdown_extensions(),
        )?;
        self.advance(Stage::ContentDiscovered);
        tracing::info!(
            posts = discovered.posts.len(),
            pages = discovered.pages.len(),
            skipped = discovered.diagnostics.len(),
            "discovered content"
        );
        let parsed = discovered.posts.len() + discovered.pages.len();
        check_diagnostics(
            &mut discovered.diagnostics,
            discovered.attempted,
            parsed,
            self.options,
        )?;

        let aggregate = Aggregate::new(
            &discovered.posts,
            self.options.include_drafts,
            config.posts_per_page(),
        );
        self.advance(Stage::Aggregated);

        let output_dir = self.project.output_directory(config);
        clean(&self.project, &output_dir)?;
        self.advance(Stage::Rendering);

        let writer = Writer {
            renderer,
            resolver: Resolver::new(&output_dir),
            config,
        };
        let written = writer.write_all(&aggregate, &discovered.pages)?;
        let feed = feed::feed_xml(config, &writer.resolver, &aggregate.posts)?;
        write_file(&writer.resolver.feed().path, feed.as_bytes())?;

        let assets = copy_dir(
            &self.project.static_source_directory,
            &output_dir.join(config.static_dir()),
        )?;
        self.advance(Stage::AssetsCopied);

        Ok(BuildReport {
            posts: written.posts,
            pages: written.pages,
            tags: written.tags,
            index_pages: written.index_pages,
            assets,
            output_dir,
            diagnostics: discovered.diagnostics,
        })
    }
}

/// Builds the project at `project` with `options`.
pub fn build_site(project: Project, options: BuildOptions) -> Result<BuildReport> {
    Build::new(project, options).run()
}

/// Logs every diagnostic and decides whether the build can go on without
/// the files they name.
fn check_diagnostics(
    diagnostics: &mut Vec<Diagnostic>,
    attempted: usize,
    parsed: usize,
    options: BuildOptions,
) -> Result<()> {
    for diagnostic in diagnostics.iter() {
        tracing::warn!("skipping {}", diagnostic.error);
    }

    let escape = diagnostics
        .iter()
        .position(|d| matches!(d.error, ParseError::PathEscape { .. }));
    if let Some(i) = escape {
        if let ParseError::PathEscape { path, source } = diagnostics.swap_remove(i).error {
            return Err(Error::PathEscape { path, source });
        }
    }

    if attempted > 0 && parsed == 0 {
        return Err(Error::NothingToBuild { attempted });
    }
    if options.strict && !diagnostics.is_empty() {
        return Err(Error::Strict {
            count: diagnostics.len(),
        });
    }
    Ok(())
}

/// Removes `output_dir` so no stale files survive, then recreates it. Refuses
/// to remove anything that could hold the project itself or overlap one of
/// its source directories.
fn clean(project: &Project, output_dir: &Path) -> Result<()> {
    let refuse = |reason| Error::CleanRefused {
        path: output_dir.to_owned(),
        reason,
    };
    let sources = project.source_directories();
    let lexical_output = lexical(output_dir);
    if sources
        .iter()
        .any(|source| overlaps(&lexical(source), &lexical_output))
    {
        return Err(refuse("it overlaps the project's sources"));
    }

    if output_dir.exists() {
        let canonical = |path: &Path| {
            std::fs::canonicalize(path).map_err(|err| Error::Clean {
                path: path.to_owned(),
                err,
            })
        };
        let root = canonical(&project.root)?;
        let output = canonical(output_dir)?;
        if output.parent().is_none() {
            return Err(refuse("it is a filesystem root"));
        }
        if root.starts_with(&output) {
            return Err(refuse("it contains the project"));
        }
        if output.join(CONFIG_FILE).exists() {
            return Err(refuse("it contains a site configuration"));
        }
        for source in sources.iter().filter(|source| source.exists()) {
            if overlaps(&canonical(source)?, &output) {
                return Err(refuse("it overlaps the project's sources"));
            }
        }
        rmdir(output_dir)?;
    }
    std::fs::create_dir_all(output_dir).map_err(|err| Error::Clean {
        path: output_dir.to_owned(),
        err,
    })
}

/// Drops `.` components so paths joined onto the same root compare equal.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Reports whether either path is the other or lies beneath it.
fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

/// Copies `src` into `dst` byte for byte, preserving its structure, and
/// returns the number of files copied. A missing `src` copies nothing.
fn copy_dir(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        tracing::debug!(dir = %src.display(), "no static directory; skipping assets");
        return Ok(0);
    }

    let io = |path: &Path, err| Error::Io {
        path: path.to_owned(),
        err,
    };
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(src).to_owned();
            Error::Io {
                path,
                err: err.into(),
            }
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|err| io(&target, err))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|err| io(parent, err))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|err| io(entry.path(), err))?;
            copied += 1;
        }
    }
    tracing::debug!(count = copied, "copied assets");
    Ok(copied)
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] config::Error),

    /// Returned when templates fail to load.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Returned when two posts or two pages share a slug.
    #[error(transparent)]
    SlugCollision(#[from] SlugCollision),

    /// Returned when a content file's slug would escape the output root.
    #[error("{}: slug {source}", .path.display())]
    PathEscape {
        path: PathBuf,
        #[source]
        source: PathEscape,
    },

    /// Returned when content files exist but none of them parsed.
    #[error("nothing to build: none of the {attempted} content files could be parsed")]
    NothingToBuild { attempted: usize },

    /// Returned in strict mode when any content file failed to parse.
    #[error("{count} content file(s) failed to parse (strict mode)")]
    Strict { count: usize },

    /// Returned when the output directory is unsafe to remove.
    #[error("refusing to clean `{}`: {reason}", .path.display())]
    CleanRefused { path: PathBuf, reason: &'static str },

    /// Returned for I/O problems while cleaning the output directory.
    #[error("cleaning directory `{}`: {err}", .path.display())]
    Clean {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for errors rendering or writing pages.
    #[error(transparent)]
    Write(#[from] write::Error),

    /// Returned for errors building the feed.
    #[error(transparent)]
    Feed(#[from] feed::Error),

    /// Returned for I/O problems while copying assets.
    #[error("copying `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn diagnostic(name: &str, error: ParseError) -> Diagnostic {
        Diagnostic {
            path: PathBuf::from(name),
            error,
        }
    }

    fn front_matter(name: &str) -> Diagnostic {
        diagnostic(
            name,
            ParseError::FrontMatter {
                path: PathBuf::from(name),
                reason: String::from("bad"),
            },
        )
    }

    #[test]
    fn test_diagnostics_policy() {
        let lenient = BuildOptions::default();
        let strict = BuildOptions {
            strict: true,
            ..BuildOptions::default()
        };

        assert!(check_diagnostics(&mut vec![front_matter("a.md")], 2, 1, lenient).is_ok());
        assert!(check_diagnostics(&mut Vec::new(), 0, 0, lenient).is_ok());
        assert!(matches!(
            check_diagnostics(&mut vec![front_matter("a.md")], 1, 0, lenient),
            Err(Error::NothingToBuild { attempted: 1 })
        ));
        assert!(matches!(
            check_diagnostics(&mut vec![front_matter("a.md")], 2, 1, strict),
            Err(Error::Strict { count: 1 })
        ));
        assert!(check_diagnostics(&mut Vec::new(), 2, 2, strict).is_ok());
    }

    #[test]
    fn test_unreadable_entries_dont_count_as_parse_failures() {
        // One post parsed; the only diagnostic is a walk error that was
        // never counted as an attempted file.
        let walk_error = diagnostic(
            "content/pages/locked",
            ParseError::Io {
                path: PathBuf::from("content/pages/locked"),
                err: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            },
        );
        assert!(check_diagnostics(&mut vec![walk_error], 1, 1, BuildOptions::default()).is_ok());

        let mut failed = vec![front_matter("a.md"), front_matter("content/pages/locked")];
        assert!(matches!(
            check_diagnostics(&mut failed, 1, 0, BuildOptions::default()),
            Err(Error::NothingToBuild { attempted: 1 })
        ));
    }

    #[test]
    fn test_path_escape_is_always_fatal() {
        let escape = crate::resolve::check_segment("../x").unwrap_err();
        let mut diagnostics = vec![
            front_matter("a.md"),
            diagnostic(
                "b.md",
                ParseError::PathEscape {
                    path: PathBuf::from("b.md"),
                    source: escape,
                },
            ),
        ];
        match check_diagnostics(&mut diagnostics, 10, 8, BuildOptions::default()) {
            Err(Error::PathEscape { path, .. }) => assert_eq!(PathBuf::from("b.md"), path),
            other => panic!("expected a path escape, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_refuses_project_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
        assert!(matches!(
            clean(&Project::at(dir.path()), dir.path()),
            Err(Error::CleanRefused { .. })
        ));
        let child = dir.path().join("child");
        fs::create_dir(&child).unwrap();
        assert!(matches!(
            clean(&Project::at(&child), dir.path()),
            Err(Error::CleanRefused { .. })
        ));
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_clean_refuses_other_sites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("site");
        fs::create_dir(&out).unwrap();
        fs::write(out.join(CONFIG_FILE), "").unwrap();
        assert!(matches!(
            clean(&Project::at(dir.path()), &out),
            Err(Error::CleanRefused { .. })
        ));
    }

    #[test]
    fn test_clean_refuses_source_directories() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::at(dir.path());
        fs::create_dir_all(&project.posts_source_directory).unwrap();
        fs::write(project.posts_source_directory.join("a.md"), "post").unwrap();
        fs::create_dir_all(&project.templates_directory).unwrap();
        fs::create_dir_all(project.static_source_directory.join("img")).unwrap();
        fs::write(project.static_source_directory.join("img/logo.png"), "png").unwrap();

        for output in &["content", "content/posts", "content/posts/deep", "templates", "static", "static/img"] {
            assert!(
                matches!(
                    clean(&project, &dir.path().join(output)),
                    Err(Error::CleanRefused { .. })
                ),
                "{}",
                output
            );
        }
        assert!(project.posts_source_directory.join("a.md").is_file());
        assert!(project.static_source_directory.join("img/logo.png").is_file());

        let dotted = Project::at(&dir.path().join("."));
        assert!(matches!(
            clean(&dotted, &dir.path().join("static")),
            Err(Error::CleanRefused { .. })
        ));
    }

    #[test]
    fn test_clean_allows_siblings_of_sources() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::at(dir.path());
        fs::create_dir_all(&project.posts_source_directory).unwrap();
        clean(&project, &dir.path().join("content/site"))?;
        clean(&project, &dir.path().join("static-out"))?;
        assert!(project.posts_source_directory.is_dir());
        Ok(())
    }

    #[test]
    fn test_clean_removes_stale_files() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("site");
        fs::create_dir_all(out.join("old")).unwrap();
        fs::write(out.join("old/index.html"), "stale").unwrap();
        clean(&Project::at(dir.path()), &out)?;
        assert!(out.is_dir());
        assert!(!out.join("old").exists());

        let fresh = dir.path().join("fresh");
        clean(&Project::at(dir.path()), &fresh)?;
        assert!(fresh.is_dir());
        Ok(())
    }

    #[test]
    fn test_copy_dir() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("static");
        fs::create_dir_all(src.join("css")).unwrap();
        let bytes: Vec<u8> = (0..=255).collect();
        fs::write(src.join("css/site.css"), "body{}").unwrap();
        fs::write(src.join("logo.bin"), &bytes).unwrap();

        let dst = dir.path().join("site/static");
        assert_eq!(2, copy_dir(&src, &dst)?);
        assert_eq!("body{}", fs::read_to_string(dst.join("css/site.css")).unwrap());
        assert_eq!(bytes, fs::read(dst.join("logo.bin")).unwrap());

        assert_eq!(0, copy_dir(&dir.path().join("missing"), &dst)?);
        Ok(())
    }

    #[test]
    fn test_stage_starts_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let mut build = Build::new(Project::at(dir.path()), BuildOptions::default());
        assert_eq!(Stage::NotStarted, build.stage());
        assert!(matches!(build.run(), Err(Error::Config(_))));
        assert_eq!(Stage::Failed, build.stage());
    }
}
