//! Support for creating an RSS 2.0 feed from the published posts.

use crate::config::SiteConfig;
use crate::content::ParsedContent;
use crate::resolve::{self, PathEscape, Resolver};
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rss::validation::Validate;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, Item, ItemBuilder};

/// Builds the feed document for `posts`, which must already be in published
/// order. At most `feed_limit` posts are included when the configuration
/// sets one.
pub fn feed_xml(
    config: &SiteConfig,
    resolver: &Resolver,
    posts: &[&ParsedContent],
) -> Result<String> {
    let limit = config.feed_limit().unwrap_or(posts.len());
    let posts = &posts[..limit.min(posts.len())];

    let items = posts
        .iter()
        .map(|post| item(config, resolver, post))
        .collect::<Result<Vec<Item>>>()?;

    // The newest post's date rather than the wall clock, so rebuilding
    // unchanged content produces an identical feed.
    let last_build_date = posts
        .first()
        .map(|post| rfc2822(&post.date, config.timezone()));

    let channel = ChannelBuilder::default()
        .title(config.site_name())
        .link(config.base_url().as_str())
        .description(
            config
                .description()
                .unwrap_or_else(|| config.site_name())
                .to_owned(),
        )
        .generator(Some(String::from("marksite")))
        .last_build_date(last_build_date)
        .items(items)
        .build();

    channel
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;
    Ok(channel.to_string())
}

fn item(config: &SiteConfig, resolver: &Resolver, post: &ParsedContent) -> Result<Item> {
    let link = resolve::absolute(config.base_url(), &resolver.post(post.slug.as_str())?.url);
    let description = match &post.description {
        Some(description) => description.clone(),
        None => post.summary().0.to_owned(),
    };
    let categories = post
        .tags
        .iter()
        .map(|tag| CategoryBuilder::default().name(tag.as_str()).build())
        .collect::<Vec<_>>();

    Ok(ItemBuilder::default()
        .title(Some(post.title.clone()))
        .link(Some(link.clone()))
        .guid(GuidBuilder::default().permalink(true).value(link).build())
        .description(description)
        .pub_date(rfc2822(&post.date, config.timezone()))
        .categories(categories)
        .build())
}

/// Formats a naive front matter date as RFC 2822, interpreting it in `tz`.
/// A local time that doesn't exist in `tz` (a spring-forward gap) is taken
/// as UTC.
fn rfc2822(date: &NaiveDateTime, tz: Tz) -> String {
    match tz.from_local_datetime(date).earliest() {
        Some(local) => local.to_rfc2822(),
        None => Utc.from_utc_datetime(date).to_rfc2822(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem building the feed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a post's URL can't be resolved.
    #[error(transparent)]
    PathEscape(#[from] PathEscape),

    /// Returned when the assembled feed isn't valid RSS.
    #[error("invalid feed: {0}")]
    Validation(String),
}
