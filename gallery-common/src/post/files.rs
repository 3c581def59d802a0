//! Open media streams returned by drivers.
//!
//! A post can carry more than one media file (an image and a video variant, for example), so
//! drivers hand out [`Files`], an ordered list of independent [`FileStream`]s. Each stream reads
//! straight from the connection it was opened on and is never buffered whole in memory.
//! Dropping a stream closes it and releases the connection, whether or not it was read to the
//! end.
use std::{
    fmt::Debug,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, ReadBuf};

/// Every media stream attached to one post, primary file first.
pub type Files = Vec<FileStream>;

/// A single open media stream.
pub struct FileStream {
    url: String,
    content_length: Option<u64>,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl FileStream {
    pub fn new<R>(url: impl Into<String>, content_length: Option<u64>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            url: url.into(),
            content_length,
            reader: Box::pin(reader),
        }
    }

    /// URL the stream was opened from.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Size announced by the server, if any.
    #[inline]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// File extension guessed from the URL path, lowercased.
    pub fn extension(&self) -> Option<String> {
        let path = self.url.split(['?', '#']).next()?;
        let file_name = path.rsplit('/').next()?;
        let (_, ext) = file_name.rsplit_once('.')?;
        (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

impl AsyncRead for FileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

impl Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("URL", &self.url)
            .field("Content Length", &self.content_length)
            .finish_non_exhaustive()
    }
}
