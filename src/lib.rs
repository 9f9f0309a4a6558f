//! The library code for the `marksite` static site generator. A build is a
//! single pass over a project directory:
//!
//! 1. Load and validate `config.yaml` ([`crate::config`])
//! 2. Discover and parse posts and pages ([`crate::discover`],
//!    [`crate::frontmatter`])
//! 3. Order the published posts and group them by tag and into index pages
//!    ([`crate::aggregate`])
//! 4. Render every page through the templates and write it to the output
//!    root ([`crate::write`], [`crate::template`], [`crate::resolve`]),
//!    along with the RSS feed ([`crate::feed`]) and the static assets
//!
//! [`crate::build`] drives the steps and decides which problems stop the
//! build. A file that fails to parse is skipped with a warning; anything
//! that would write to the wrong place, or that the templates can't render,
//! is fatal.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod aggregate;
pub mod build;
pub mod config;
pub mod content;
pub mod discover;
pub mod feed;
pub mod frontmatter;
pub mod markdown;
pub mod resolve;
pub mod template;
pub mod write;
