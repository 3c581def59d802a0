//! Main representation of a gallery post
//!
//! # Post
//! A [`Post` struct](Post) is a generic representation of an image board post.
//!
//! Every source exposes a different schema, but the metadata a gallery client needs to list,
//! sort and filter posts is the same everywhere. Drivers map their upstream records into this
//! struct exactly once and throw the upstream record away.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::{fmt::Debug, num::ParseIntError};

pub use self::comment::Comment;
pub use self::files::{FileStream, Files};

pub mod comment;
pub mod files;

/// Catchall model for the metadata of a single post, independent of the source it came from.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Permalink to the post page on the source website.
    pub url: String,
    /// Identifier given by the source, kept verbatim.
    ///
    /// Sources with numeric ids have them stringified in base 10, see [`Post::numeric_id`].
    pub id: String,
    /// Moment the post was created on the source.
    pub date: DateTime<Utc>,
    /// `false` only for posts the source explicitly rates as safe.
    pub nsfw: bool,
    pub description: String,
    /// Aggregate score. Can be negative.
    pub score: i64,
    /// All tags of the post joined by a single space. Tag categories are not kept.
    pub tags: String,
    /// Identifier of the uploader, stringified the same way as [`id`](Post::id).
    pub uploader: String,
    /// Source attribution provided by the uploader. Empty when there is none.
    pub source: String,
}

impl Debug for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Post")
            .field("Post ID", &self.id)
            .field("Post URL", &self.url)
            .field("Date", &self.date)
            .field("NSFW", &self.nsfw)
            .field("Score", &self.score)
            .field("Uploader", &self.uploader)
            .field("Source", &self.source)
            .field("Tag List", &self.tags)
            .finish_non_exhaustive()
    }
}

impl Post {
    /// Parses the id back into the number it was built from.
    ///
    /// Only meaningful for sources that use numeric ids.
    #[inline]
    pub fn numeric_id(&self) -> Result<u64, ParseIntError> {
        self.id.parse()
    }

    /// Iterates over the individual tags of the post.
    #[inline]
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }
}
