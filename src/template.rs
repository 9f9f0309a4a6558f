//! Renders pages through named templates. [`Renderer`] is the seam the build
//! renders through; [`GtmplRenderer`] is the implementation backed by
//! [`gtmpl`] templates loaded from the project's `templates/` directory.
//!
//! If the directory contains a `base.html`, its text is placed in front of
//! every other template before parsing, the same way several template files
//! are concatenated so they share `{{define}}` blocks. A layout in
//! `base.html` that calls `{{template "content" .}}` is thereby "extended"
//! by any template that defines `content`.

use gtmpl::{Template, Value};
use pulldown_cmark::escape::escape_html;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The template every other template is composed with, if it exists.
pub const BASE_TEMPLATE: &str = "base.html";

const EXTENSIONS: &[&str] = &["html", "xml"];

/// Renders a named template against a context value.
pub trait Renderer {
    fn render(&self, template: &str, context: Value) -> Result<String>;
}

/// Templates parsed from a directory, keyed by their path relative to it
/// (always `/`-separated, e.g. `post.html` or `partials/nav.html`).
pub struct GtmplRenderer {
    templates: HashMap<String, Template>,
}

impl GtmplRenderer {
    /// Loads and parses every `*.html` and `*.xml` file beneath `dir`.
    pub fn load(dir: &Path) -> Result<GtmplRenderer> {
        let base_path = dir.join(BASE_TEMPLATE);
        let base = match base_path.is_file() {
            true => Some(read(&base_path)?),
            false => None,
        };

        let mut templates = HashMap::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(dir).to_owned();
                TemplateError::Read {
                    path,
                    err: err.into(),
                }
            })?;
            let path = entry.path();
            let wanted = entry.file_type().is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| EXTENSIONS.contains(&ext));
            if !wanted {
                continue;
            }

            let name = template_name(dir, path);
            if name == BASE_TEMPLATE {
                continue;
            }
            let mut text = String::new();
            if let Some(base) = &base {
                text.push_str(base);
                text.push(' ');
            }
            text.push_str(&read(path)?);
            templates.insert(name.clone(), parse(&name, &text)?);
        }
        tracing::debug!(count = templates.len(), dir = %dir.display(), "loaded templates");
        Ok(GtmplRenderer { templates })
    }

    /// Builds a renderer from in-memory `(name, text)` pairs without any
    /// base composition.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<GtmplRenderer> {
        let mut templates = HashMap::new();
        for (name, text) in sources {
            templates.insert(name.to_owned(), parse(name, text)?);
        }
        Ok(GtmplRenderer { templates })
    }

    #[cfg(test)]
    fn contains(&self, template: &str) -> bool {
        self.templates.contains_key(template)
    }
}

impl Renderer for GtmplRenderer {
    fn render(&self, template: &str, context: Value) -> Result<String> {
        let failed = |message: String| TemplateError::Render {
            template: template.to_owned(),
            message,
        };
        let parsed = self
            .templates
            .get(template)
            .ok_or_else(|| TemplateError::Missing {
                template: template.to_owned(),
            })?;
        let context = gtmpl::Context::from(context).map_err(|err| failed(err.to_string()))?;
        let mut out: Vec<u8> = Vec::new();
        parsed
            .execute(&mut out, &context)
            .map_err(|err| failed(err.to_string()))?;
        String::from_utf8(out).map_err(|err| failed(err.to_string()))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| TemplateError::Read {
        path: path.to_owned(),
        err,
    })
}

fn parse(name: &str, text: &str) -> Result<Template> {
    let mut template = Template::default();
    template
        .parse(text)
        .map_err(|err| TemplateError::Parse {
            template: name.to_owned(),
            message: err.to_string(),
        })?;
    Ok(template)
}

fn template_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// HTML-escapes `text` for use in page markup.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let _ = escape_html(&mut out, text);
    out
}

/// An escaped text value.
pub fn text(value: &str) -> Value {
    Value::String(escape(value))
}

/// A value that is already HTML, passed through unescaped.
pub fn raw(html: &str) -> Value {
    Value::String(html.to_owned())
}

pub fn object<'k>(fields: impl IntoIterator<Item = (&'k str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect::<HashMap<String, Value>>(),
    )
}

/// A value for an optional URL or item: the value, or nil (falsy in
/// templates).
pub fn optional<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map_or(Value::Nil, f)
}

/// Links between index pages.
#[derive(Clone, Debug, PartialEq)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

/// One page to be rendered. The variant decides both the template and the
/// shape of the context; item values are built by the caller.
pub enum RenderTarget<'a> {
    Post {
        post: Value,
        title: &'a str,
        tags: Value,
        prev: Value,
        next: Value,
    },
    Page {
        page: Value,
        title: &'a str,
        template: Option<&'a str>,
    },
    TagArchive {
        tag: &'a str,
        url: &'a str,
        posts: Value,
    },
    IndexPage {
        posts: Value,
        pagination: Pagination,
    },
}

impl RenderTarget<'_> {
    /// The name of the template this target renders with.
    pub fn template(&self) -> &str {
        match self {
            RenderTarget::Post { .. } => "post.html",
            RenderTarget::Page { template, .. } => template.unwrap_or("page.html"),
            RenderTarget::TagArchive { .. } => "tag.html",
            RenderTarget::IndexPage { .. } => "index.html",
        }
    }

    /// Builds the template context. `site` is shared by every target;
    /// `site_name` is used for index page titles.
    pub fn context(self, site: &Value, site_name: &str) -> Value {
        let mut fields: Vec<(&str, Value)> = vec![("site", site.clone())];
        match self {
            RenderTarget::Post {
                post,
                title,
                tags,
                prev,
                next,
            } => fields.extend([
                ("post", post),
                ("page_title", text(title)),
                ("tags", tags),
                ("prev", prev),
                ("next", next),
            ]),
            RenderTarget::Page { page, title, .. } => {
                fields.extend([("page", page), ("page_title", text(title))])
            }
            RenderTarget::TagArchive { tag, url, posts } => fields.extend([
                ("tag", text(tag)),
                ("url", Value::String(url.to_owned())),
                ("posts", posts),
                ("page_title", text(&format!("Posts tagged '{}'", tag))),
            ]),
            RenderTarget::IndexPage { posts, pagination } => {
                let page_title = match pagination.current_page {
                    0 | 1 => site_name.to_owned(),
                    n => format!("{} - Page {}", site_name, n),
                };
                fields.extend([
                    ("posts", posts),
                    ("page_title", text(&page_title)),
                    (
                        "pagination",
                        object([
                            ("current_page", Value::from(pagination.current_page as u64)),
                            ("total_pages", Value::from(pagination.total_pages as u64)),
                            ("has_prev", Value::Bool(pagination.prev_url.is_some())),
                            ("has_next", Value::Bool(pagination.next_url.is_some())),
                            ("prev_url", optional(pagination.prev_url, Value::String)),
                            ("next_url", optional(pagination.next_url, Value::String)),
                        ]),
                    ),
                ]);
            }
        }
        object(fields)
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// A template failure. Any of these aborts the build.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Returned when a target asks for a template that wasn't loaded.
    #[error("template `{template}` not found")]
    Missing { template: String },

    /// Returned when a template file can't be read.
    #[error("reading template `{}`: {err}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a template doesn't parse.
    #[error("parsing template `{template}`: {message}")]
    Parse { template: String, message: String },

    /// Returned when executing a template fails.
    #[error("rendering template `{template}`: {message}")]
    Render { template: String, message: String },
}
