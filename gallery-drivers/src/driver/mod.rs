//! The interface every source driver exposes to the host application.
//! # Drivers
//!
//! A driver adapts one upstream image board API to the shared [`Post`] model. Drivers are
//! independent implementations of [`Driver`]; the only things they share are the
//! [`Fetcher`](crate::fetcher::Fetcher) and [`RateLimiter`](crate::limiter::RateLimiter)
//! helpers.
//!
//! All operations take `&self`, so one driver can be shared between tasks behind an `Arc`.
//! Dropping an operation's future aborts it at its next suspension point.
use gallery_common::post::{Comment, Files, Post};
use std::future::Future;

use crate::error::DriverError;

pub use self::caps::DriverFeatures;

pub mod caps;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub posts: Vec<Post>,
    /// Total number of results for the query, when the source reports it.
    ///
    /// Sources that don't expose a total always report `0`, so `0` means "unknown" just as
    /// much as it means "no results". Check whether [`posts`](SearchPage::posts) is empty to
    /// tell the two apart.
    pub count_hint: u64,
}

impl SearchPage {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            posts: Vec::new(),
            count_hint: 0,
        }
    }
}

/// This trait should be the only common public interface all drivers expose aside from some
/// source-specific configuration.
pub trait Driver: Send + Sync {
    /// Unique identifier of the source. Never does I/O.
    fn name(&self) -> &str;

    /// Searches posts matching `query`.
    ///
    /// `page` is 0-based for every driver, whatever numbering the upstream uses. `limit` is
    /// the page size requested from the upstream.
    fn search(
        &self,
        query: &str,
        page: u64,
        limit: u64,
    ) -> impl Future<Output = Result<SearchPage, DriverError>> + Send;

    /// Fetches the metadata of a single post.
    fn post(&self, id: &str) -> impl Future<Output = Result<Post, DriverError>> + Send;

    /// Opens the media files of a post, primary file first.
    ///
    /// The streams are not read; the caller consumes and drops them.
    fn file(&self, id: &str) -> impl Future<Output = Result<Files, DriverError>> + Send;

    /// Fetches the comments of a post.
    ///
    /// Drivers for sources without comments return an empty list, never an error. See
    /// [`DriverFeatures::COMMENTS`].
    fn comments(&self, id: &str) -> impl Future<Output = Result<Vec<Comment>, DriverError>> + Send;

    /// Expose some bitflags to indicate the features this driver supports
    fn features() -> DriverFeatures
    where
        Self: Sized;
}
