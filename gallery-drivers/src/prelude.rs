pub use crate::driver::Driver;
pub use crate::driver::DriverFeatures;
pub use crate::driver::SearchPage;
pub use crate::driver_config::ServerConfig;
pub use crate::driver_config::DEFAULT_SERVERS;
pub use crate::error::DriverError;
pub use crate::error::MappingError;

#[cfg(feature = "e621")]
pub use crate::drivers::e621::E621Api;
#[cfg(feature = "e621")]
pub use crate::drivers::e621::E621Driver;
