//! Orders the published posts and groups them by tag and into index pages.

use crate::content::ParsedContent;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Posts grouped by tag, keyed and iterated in tag order. Each list keeps
/// the published ordering.
pub type TagIndex<'a> = BTreeMap<String, Vec<&'a ParsedContent>>;

/// Newest first; equal dates fall back to slug, then source path, so the
/// order never depends on discovery order.
pub fn newest_first(a: &ParsedContent, b: &ParsedContent) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.slug.cmp(&b.slug))
        .then_with(|| a.source.cmp(&b.source))
}

/// Selects the posts to publish (drafts only when `include_drafts`) and
/// sorts them with [`newest_first`].
pub fn published(posts: &[ParsedContent], include_drafts: bool) -> Vec<&ParsedContent> {
    let mut published: Vec<&ParsedContent> = posts
        .iter()
        .filter(|post| include_drafts || !post.draft)
        .collect();
    published.sort_by(|a, b| newest_first(a, b));
    published
}

/// Indexes `posts` (already in published order) by each of their tags.
pub fn tag_index<'a>(posts: &[&'a ParsedContent]) -> TagIndex<'a> {
    let mut index = TagIndex::new();
    for post in posts {
        for tag in &post.tags {
            index.entry(tag.clone()).or_default().push(*post);
        }
    }
    index
}

/// One index page's worth of posts.
#[derive(Clone, Debug, PartialEq)]
pub struct PageGroup<'a> {
    pub posts: Vec<&'a ParsedContent>,

    /// 1-based.
    pub number: usize,

    pub total: usize,
}

impl PageGroup<'_> {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total
    }
}

/// Splits `posts` into groups of at most `per_page`. There is always at
/// least one group, so an empty site still gets a front page.
pub fn paginate<'a>(posts: &[&'a ParsedContent], per_page: usize) -> Vec<PageGroup<'a>> {
    let per_page = per_page.max(1);
    if posts.is_empty() {
        return vec![PageGroup {
            posts: Vec::new(),
            number: 1,
            total: 1,
        }];
    }

    let total = (posts.len() + per_page - 1) / per_page;
    posts
        .chunks(per_page)
        .enumerate()
        .map(|(i, chunk)| PageGroup {
            posts: chunk.to_vec(),
            number: i + 1,
            total,
        })
        .collect()
}

/// The published posts of a build along with their tag index and index
/// pages.
#[derive(Debug)]
pub struct Aggregate<'a> {
    pub posts: Vec<&'a ParsedContent>,
    pub tags: TagIndex<'a>,
    pub groups: Vec<PageGroup<'a>>,
}

impl<'a> Aggregate<'a> {
    pub fn new(posts: &'a [ParsedContent], include_drafts: bool, per_page: usize) -> Self {
        let posts = published(posts, include_drafts);
        let tags = tag_index(&posts);
        let groups = paginate(&posts, per_page);
        Aggregate {
            posts,
            tags,
            groups,
        }
    }
}
