//! Driver for `https://e621.net`
//!
//! Also works for the safe mirror `https://e926.net`, which serves the same API.
//!
//! The e621 driver has the following features:
//! - Tag search
//! - Single post fetch
//! - File download
//!
//! The API has no comment endpoint, so [`comments`](Driver::comments) always returns an empty
//! list.
use gallery_common::{
    chrono::{DateTime, Utc},
    log::debug,
    post::{Comment, Files, Post},
    reqwest::{Client, StatusCode, Url},
};
use tokio_util::sync::CancellationToken;

use crate::driver::{Driver, DriverFeatures, SearchPage};
use crate::driver_config::{ServerConfig, DEFAULT_SERVERS};
use crate::error::{DriverError, MappingError};
use crate::fetcher::Fetcher;

use self::models::{E621Post, E621SinglePostTopLevel, E621TopLevel};

pub mod models;

/// Rating code e621 uses for safe posts. Everything else counts as NSFW.
const SAFE_RATING: &str = "s";

/// URL building and post mapping for the e621 API. Does no I/O.
#[derive(Debug, Clone)]
pub struct E621Api {
    base_url: String,
    post_url: String,
    post_list_url: String,
}

impl E621Api {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            post_url: config.post_url.trim_end_matches('/').to_string(),
            post_list_url: config.post_list_url.clone(),
        }
    }

    /// Listing URL for a 0-based `page`. The API counts pages from 1.
    pub fn posts_url(&self, query: &str, page: u64, limit: u64) -> Result<Url, DriverError> {
        let page = page.saturating_add(1).to_string();
        let limit = limit.to_string();

        Url::parse_with_params(
            &self.post_list_url,
            &[("tags", query), ("page", &page), ("limit", &limit)],
        )
        .map_err(|source| DriverError::InvalidUrl {
            url: self.post_list_url.clone(),
            source,
        })
    }

    pub fn single_post_url(&self, post_id: u64) -> Result<Url, DriverError> {
        let url = format!("{}/{post_id}.json", self.post_url);
        Url::parse(&url).map_err(|source| DriverError::InvalidUrl { url, source })
    }

    /// Permalink of a post. Built from the id rather than trusting anything in the response.
    #[must_use]
    pub fn post_page_url(&self, post_id: u64) -> String {
        format!("{}/{post_id}", self.post_url)
    }

    /// Resolves a file URL from the API against the server, in case it's relative.
    pub fn file_url(&self, raw: &str) -> Result<Url, DriverError> {
        Url::parse(&self.base_url)
            .and_then(|base| base.join(raw))
            .map_err(|source| DriverError::InvalidUrl {
                url: raw.to_string(),
                source,
            })
    }

    /// Checks that `id` is a plain decimal post id and returns its value.
    pub fn parse_post_id(id: &str) -> Result<u64, DriverError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DriverError::InvalidPostId { id: id.to_string() });
        }

        id.parse()
            .map_err(|_| DriverError::InvalidPostId { id: id.to_string() })
    }

    pub fn map_post(&self, item: E621Post) -> Result<Post, MappingError> {
        let date = DateTime::parse_from_rfc3339(&item.created_at).map_err(|source| {
            MappingError {
                post_id: item.id.to_string(),
                value: item.created_at.clone(),
                source,
                partial: Vec::new(),
            }
        })?;

        let source = item
            .source
            .filter(|s| !s.is_empty())
            .or_else(|| item.sources.into_iter().next())
            .unwrap_or_default();

        Ok(Post {
            url: self.post_page_url(item.id),
            id: item.id.to_string(),
            date: date.with_timezone(&Utc),
            nsfw: item.rating != SAFE_RATING,
            description: item.description.unwrap_or_default(),
            score: item.score.total,
            tags: item.tags.to_tag_string(),
            uploader: item.uploader_id.to_string(),
            source,
        })
    }

    /// Maps a whole listing in order. Stops at the first record that fails, handing back
    /// everything mapped before it inside the error.
    pub fn map_post_list_response(
        &self,
        response: E621TopLevel,
    ) -> Result<Vec<Post>, MappingError> {
        let mut posts = Vec::with_capacity(response.posts.len());

        for item in response.posts {
            match self.map_post(item) {
                Ok(post) => posts.push(post),
                Err(mut err) => {
                    debug!("Post {} failed to map after {} posts", err.post_id, posts.len());
                    err.partial = posts;
                    return Err(err);
                }
            }
        }

        debug!("List size: {}", posts.len());
        Ok(posts)
    }

    /// This is a separate lower level function to map posts by feeding a custom JSON listing
    /// obtained through other means.
    pub fn map_posts(&self, raw_json: &str) -> Result<Vec<Post>, DriverError> {
        let response: E621TopLevel =
            serde_json::from_str(raw_json).map_err(|source| DriverError::Decode {
                url: String::new(),
                source,
            })?;

        Ok(self.map_post_list_response(response)?)
    }
}

/// Main object to fetch posts from e621.
#[derive(Debug)]
pub struct E621Driver {
    name: String,
    api: E621Api,
    fetcher: Fetcher,
    cancel: CancellationToken,
}

impl E621Driver {
    /// Sets up a driver for `https://e621.net` with the default limits.
    pub fn new() -> Result<Self, DriverError> {
        let config = DEFAULT_SERVERS
            .get("e621")
            .cloned()
            .unwrap_or_default();
        Self::new_with_config(config)
    }

    /// Sets up a driver for any server speaking the e621 API.
    pub fn new_with_config(config: ServerConfig) -> Result<Self, DriverError> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Self::from_parts(config, fetcher))
    }

    /// Same as [`new_with_config`](Self::new_with_config), reusing an existing client.
    #[must_use]
    pub fn with_client(client: Client, config: ServerConfig) -> Self {
        let fetcher = Fetcher::with_client(client, &config);
        Self::from_parts(config, fetcher)
    }

    fn from_parts(config: ServerConfig, fetcher: Fetcher) -> Self {
        Self {
            api: E621Api::new(&config),
            name: config.name,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the token that aborts this driver's pending operations.
    ///
    /// Pass a child of the host's own token to tie the driver to the host's lifetime.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts every pending operation of this driver when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[inline]
    #[must_use]
    pub const fn api(&self) -> &E621Api {
        &self.api
    }

    async fn fetch_single(&self, id: &str) -> Result<E621Post, DriverError> {
        let post_id = E621Api::parse_post_id(id)?;
        let url = self.api.single_post_url(post_id)?;

        debug!("Fetching post {post_id}");
        let response: E621SinglePostTopLevel = self.fetcher.get_json(&url, &self.cancel).await?;
        Ok(response.post)
    }
}

impl Driver for E621Driver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, page: u64, limit: u64) -> Result<SearchPage, DriverError> {
        let url = self.api.posts_url(query, page, limit)?;

        debug!("Fetching posts from page {page}");
        let response: E621TopLevel = match self.fetcher.get_json(&url, &self.cancel).await {
            Ok(response) => response,
            Err(err) if err.status() == Some(StatusCode::GONE) => {
                debug!("Listing is gone, treating page {page} as empty");
                return Ok(SearchPage::empty());
            }
            Err(err) => return Err(err),
        };

        let posts = self.api.map_post_list_response(response)?;

        Ok(SearchPage {
            posts,
            count_hint: 0,
        })
    }

    async fn post(&self, id: &str) -> Result<Post, DriverError> {
        let item = self.fetch_single(id).await?;
        Ok(self.api.map_post(item)?)
    }

    async fn file(&self, id: &str) -> Result<Files, DriverError> {
        let item = self.fetch_single(id).await?;

        let Some(raw_url) = item.file.url else {
            return Err(DriverError::MissingField {
                id: item.id.to_string(),
                field: "file.url",
            });
        };

        let url = self.api.file_url(&raw_url)?;
        let stream = self.fetcher.get_stream(&url, &self.cancel).await?;

        Ok(vec![stream])
    }

    async fn comments(&self, _id: &str) -> Result<Vec<Comment>, DriverError> {
        Ok(Vec::new())
    }

    fn features() -> DriverFeatures {
        DriverFeatures::TAG_SEARCH | DriverFeatures::SINGLE_POST_FETCH | DriverFeatures::FILE_FETCH
    }
}
