//! Source drivers that fetch posts from image board APIs and map them into [Posts](gallery_common::post::Post).

extern crate gallery_common;

pub mod driver;
pub mod driver_config;
pub mod drivers;
pub mod error;
pub mod fetcher;
pub mod limiter;
pub mod prelude;

pub use crate::driver::Driver;
pub use crate::driver::DriverFeatures;
pub use crate::driver::SearchPage;
