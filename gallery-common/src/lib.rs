//! Data structs shared by every libgallery source driver.
//!
//! Drivers translate whatever their upstream API returns into the types found in [`post`],
//! so a host application can handle posts, comments and media files without knowing where
//! they came from.

// Public Exports
pub use chrono;
pub use log;
pub use reqwest;
pub use serde;
pub use serde_json;
pub use tokio;

pub mod post;
