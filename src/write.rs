//! Renders every published post, page, tag archive and index page through a
//! [`Renderer`] and writes the results beneath the output root.

use crate::aggregate::Aggregate;
use crate::config::SiteConfig;
use crate::content::ParsedContent;
use crate::resolve::{self, PathEscape, Resolver, Target};
use crate::template::{
    object, optional, raw, text, Pagination, RenderTarget, Renderer, TemplateError,
};
use gtmpl::Value;
use std::path::{Path, PathBuf};

/// How many files of each kind were written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Written {
    pub posts: usize,
    pub pages: usize,
    pub tags: usize,
    pub index_pages: usize,
}

/// Responsible for templating and writing HTML pages to disk.
pub struct Writer<'a> {
    pub renderer: &'a dyn Renderer,
    pub resolver: Resolver<'a>,
    pub config: &'a SiteConfig,
}

impl<'a> Writer<'a> {
    /// The `site` value shared by every template. `pages` lists every page
    /// for navigation.
    pub fn site_value(&self, pages: &[ParsedContent]) -> Result<Value> {
        let config = self.config;
        let mut nav = Vec::with_capacity(pages.len());
        for page in pages {
            let target = self.resolver.page(page.slug.as_str())?;
            nav.push(object([
                ("title", text(&page.title)),
                ("url", Value::String(target.url)),
            ]));
        }
        let keywords = config.keywords().iter().map(|k| text(k)).collect();
        Ok(object([
            ("site_name", text(config.site_name())),
            ("base_url", Value::String(config.base_url().to_string())),
            ("author", text(config.author())),
            (
                "description",
                optional(config.description(), text),
            ),
            ("keywords", Value::Array(keywords)),
            ("timezone", Value::String(config.timezone().name().to_owned())),
            ("posts_per_page", Value::from(config.posts_per_page() as u64)),
            ("feed_url", Value::String(self.resolver.feed().url)),
            (
                "static_url",
                Value::String(resolve::directory_url(config.static_dir())),
            ),
            ("pages", Value::Array(nav)),
        ]))
    }

    /// Renders and writes everything in `aggregate` plus `pages`.
    pub fn write_all(&self, aggregate: &Aggregate, pages: &[ParsedContent]) -> Result<Written> {
        let site = self.site_value(pages)?;
        let mut written = Written::default();

        let posts = &aggregate.posts;
        for (i, post) in posts.iter().enumerate() {
            let target = self.resolver.post(post.slug.as_str())?;
            let prev = match i {
                0 => None,
                _ => Some(posts[i - 1]),
            };
            let next = posts.get(i + 1).copied();
            let render = RenderTarget::Post {
                post: self.item(post, &target.url)?,
                title: &post.title,
                tags: self.tag_links(post)?,
                prev: self.neighbour(prev)?,
                next: self.neighbour(next)?,
            };
            self.write(render, &site, &target)?;
            written.posts += 1;
        }

        for page in pages {
            let target = self.resolver.page(page.slug.as_str())?;
            let render = RenderTarget::Page {
                page: self.item(page, &target.url)?,
                title: &page.title,
                template: page.template.as_deref(),
            };
            self.write(render, &site, &target)?;
            written.pages += 1;
        }

        for (tag, tagged) in &aggregate.tags {
            let target = self.resolver.tag(tag)?;
            let render = RenderTarget::TagArchive {
                tag,
                url: &target.url,
                posts: self.items(tagged)?,
            };
            self.write(render, &site, &target)?;
            written.tags += 1;
        }

        for group in &aggregate.groups {
            let target = self.resolver.index(group.number);
            let pagination = Pagination {
                current_page: group.number,
                total_pages: group.total,
                prev_url: match group.has_prev() {
                    true => Some(self.resolver.index(group.number - 1).url),
                    false => None,
                },
                next_url: match group.has_next() {
                    true => Some(self.resolver.index(group.number + 1).url),
                    false => None,
                },
            };
            let render = RenderTarget::IndexPage {
                posts: self.items(&group.posts)?,
                pagination,
            };
            self.write(render, &site, &target)?;
            written.index_pages += 1;
        }

        Ok(written)
    }

    fn write(&self, render: RenderTarget, site: &Value, target: &Target) -> Result<()> {
        let template = render.template().to_owned();
        let html = self
            .renderer
            .render(&template, render.context(site, self.config.site_name()))
            .map_err(|err| Error::Template {
                target: target.url.clone(),
                err,
            })?;
        write_file(&target.path, html.as_bytes())?;
        tracing::debug!(url = %target.url, %template, "wrote page");
        Ok(())
    }

    /// The value for one post or page: escaped text fields, raw HTML
    /// `content` and `summary`.
    pub fn item(&self, item: &ParsedContent, url: &str) -> Result<Value> {
        let (summary, summarized) = item.summary();
        Ok(object([
            ("title", text(&item.title)),
            ("date", Value::String(item.date_string())),
            (
                "datetime",
                Value::String(item.date.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ),
            ("slug", Value::String(item.slug.to_string())),
            ("url", Value::String(url.to_owned())),
            (
                "permalink",
                Value::String(resolve::absolute(self.config.base_url(), url)),
            ),
            ("tags", self.tag_links(item)?),
            ("draft", Value::Bool(item.draft)),
            (
                "description",
                optional(item.description.as_deref(), text),
            ),
            ("content", raw(&item.html)),
            ("summary", raw(summary)),
            ("summarized", Value::Bool(summarized)),
        ]))
    }

    fn items(&self, posts: &[&ParsedContent]) -> Result<Value> {
        let mut values = Vec::with_capacity(posts.len());
        for post in posts {
            let target = self.resolver.post(post.slug.as_str())?;
            values.push(self.item(post, &target.url)?);
        }
        Ok(Value::Array(values))
    }

    fn tag_links(&self, item: &ParsedContent) -> Result<Value> {
        let mut links = Vec::with_capacity(item.tags.len());
        for tag in &item.tags {
            let target = self.resolver.tag(tag)?;
            links.push(object([
                ("name", text(tag)),
                ("url", Value::String(target.url)),
            ]));
        }
        Ok(Value::Array(links))
    }

    fn neighbour(&self, post: Option<&ParsedContent>) -> Result<Value> {
        match post {
            None => Ok(Value::Nil),
            Some(post) => {
                let target = self.resolver.post(post.slug.as_str())?;
                Ok(object([
                    ("title", text(&post.title)),
                    ("url", Value::String(target.url)),
                ]))
            }
        }
    }
}

/// Writes `contents` to `path`, creating parent directories and replacing
/// any existing file.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let io = |err| Error::Io {
        path: path.to_owned(),
        err,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, contents).map_err(io)
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A slug or tag would have been written outside the output root.
    #[error(transparent)]
    PathEscape(#[from] PathEscape),

    /// An error during templating.
    #[error("rendering `{target}`: {err}")]
    Template {
        target: String,
        #[source]
        err: TemplateError,
    },

    /// An error writing the output files.
    #[error("writing `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}
