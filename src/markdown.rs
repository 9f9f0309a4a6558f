//! Converts post and page bodies from Markdown to HTML. The set of
//! [`pulldown_cmark`] options is chosen by name in the site configuration
//! (`markdown_extensions`) and resolved once into an [`Extensions`] value.

use pulldown_cmark::{html, Options, Parser};

/// The extension names used when `markdown_extensions` is absent from the
/// configuration.
pub const DEFAULT_EXTENSIONS: &[&str] = &["extra", "codehilite", "toc"];

/// A validated set of Markdown extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extensions {
    options: Options,
}

impl Extensions {
    /// Resolves extension names into parser options. Recognized names are
    /// `tables`, `footnotes`, `strikethrough`, `tasklists`,
    /// `smart_punctuation` and the bundle `extra` (tables, footnotes and
    /// strikethrough). `codehilite` and `toc` are accepted for compatibility
    /// with existing configurations but don't change the output.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
    ) -> Result<Extensions, UnknownExtension> {
        let mut options = Options::empty();
        for name in names {
            match name.as_ref().trim() {
                "extra" => {
                    options.insert(Options::ENABLE_TABLES);
                    options.insert(Options::ENABLE_FOOTNOTES);
                    options.insert(Options::ENABLE_STRIKETHROUGH);
                }
                "tables" => options.insert(Options::ENABLE_TABLES),
                "footnotes" => options.insert(Options::ENABLE_FOOTNOTES),
                "strikethrough" => options.insert(Options::ENABLE_STRIKETHROUGH),
                "tasklists" => options.insert(Options::ENABLE_TASKLISTS),
                "smart_punctuation" => {
                    options.insert(Options::ENABLE_SMART_PUNCTUATION)
                }
                "codehilite" | "toc" => {}
                other => return Err(UnknownExtension(other.to_owned())),
            }
        }
        Ok(Extensions { options })
    }

    /// The [`pulldown_cmark`] options for this set.
    pub fn options(&self) -> Options {
        self.options
    }
}

impl Default for Extensions {
    /// Equivalent to [`DEFAULT_EXTENSIONS`]: `extra` plus the two no-ops.
    fn default() -> Self {
        Extensions {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH,
        }
    }
}

/// Converts `markdown` to an HTML string. Raw HTML in the source is passed
/// through untouched; content is author-controlled and not sanitized.
pub fn to_html(markdown: &str, extensions: &Extensions) -> String {
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, extensions.options));
    out
}

/// Returned when the configuration names an extension we don't know.
#[derive(Debug, thiserror::Error)]
#[error(
    "unknown markdown extension `{0}` (expected one of: extra, tables, \
     footnotes, strikethrough, tasklists, smart_punctuation, codehilite, toc)"
)]
pub struct UnknownExtension(pub String);
