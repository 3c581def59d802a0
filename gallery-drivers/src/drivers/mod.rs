//! Implementations of [`Driver`](crate::driver::Driver) for each supported source.
//!
//! Every driver lives behind a cargo feature of the same name.
//!
//! ## Example with the `e621` driver
//! ```no_run
//! use gallery_drivers::prelude::*;
//!
//! async fn test() -> Result<(), DriverError> {
//!     let driver = E621Driver::new()?;
//!
//!     let page = driver.search("fox rating:s", 0, 20).await?; // First page, 20 posts
//!
//!     for post in &page.posts {
//!         println!("{} {}", post.id, post.url);
//!     }
//!
//!     Ok(())
//! }
//! ```
#[cfg(feature = "e621")]
pub mod e621;
