use gallery_common::{chrono, post::Post, reqwest::StatusCode};
use thiserror::Error;

/// Enumerates the possible errors that can arise during driver operations.
///
/// Variants keep their underlying cause and, for HTTP failures, the status code, so callers
/// can branch on them without matching on strings.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The request or the read of its body failed at the network level (DNS, refused
    /// connection, timeout, connection dropped mid-body). Transient failures are only returned
    /// after all retries were spent.
    #[error("Connection to {url} failed")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("Server returned {status} for {url}")]
    Http { url: String, status: StatusCode },

    /// The response body is not valid JSON or doesn't match the expected schema.
    #[error("Error while deserializing JSON from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// An upstream record could not be translated into a [`Post`].
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A post id was not in the format this source uses.
    #[error("Invalid post id: {id:?}")]
    InvalidPostId { id: String },

    /// A post is missing a field that is required to complete the operation.
    #[error("Post {id} is missing an essential field {field}")]
    MissingField { id: String, field: &'static str },

    /// A request URL could not be assembled from the server configuration.
    #[error("Invalid request URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The operation was cancelled by the caller while it was waiting.
    #[error("Operation cancelled")]
    Cancelled,

    /// The HTTP client could not be set up.
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),
}

impl DriverError {
    /// Status code of the response that caused this error, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error means the upstream is unreachable or struggling, as opposed to
    /// having replied with something unexpected.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Http { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// A record failed to map. Carries every post mapped before the failing one, in order.
#[derive(Error, Debug)]
#[error("Failed to map post {post_id}: invalid creation date {value:?}")]
pub struct MappingError {
    pub post_id: String,
    pub value: String,
    #[source]
    pub source: chrono::ParseError,
    pub(crate) partial: Vec<Post>,
}

impl MappingError {
    /// Posts that were mapped successfully before the failure.
    #[must_use]
    pub fn partial(&self) -> &[Post] {
        &self.partial
    }

    #[must_use]
    pub fn into_partial(self) -> Vec<Post> {
        self.partial
    }
}
