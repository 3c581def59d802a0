use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user comment attached to a post.
///
/// Not every source exposes comments. Drivers without comment support return an empty list
/// instead, so an empty list does not mean the post has no comments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub date: DateTime<Utc>,
}
