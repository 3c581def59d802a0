//! # libgallery
//!
//! Drivers that talk to image board APIs and hand back their posts in one common shape.
//!
//! The shared data model lives in [`common`] and the drivers themselves in [`drivers`]. Every
//! driver implements [`Driver`](drivers::Driver), so hosts can treat sources uniformly.
//!
//! ```no_run
//! use libgallery::prelude::*;
//!
//! async fn newest_fox() -> Result<Option<String>, DriverError> {
//!     let driver = E621Driver::new()?;
//!     let page = driver.search("fox order:id_desc", 0, 1).await?;
//!     Ok(page.posts.first().map(|post| post.url.clone()))
//! }
//! ```

pub use gallery_common as common;
pub use gallery_drivers as drivers;

pub use gallery_common::post::{Comment, FileStream, Files, Post};

pub mod prelude {
    pub use gallery_common::post::{Comment, FileStream, Files, Post};
    pub use gallery_drivers::prelude::*;
}
