//! Configuration, filesystem layout and logging bootstrap for the DataMed client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_APP_ORIGIN, DEFAULT_CLIENT_ID, DEFAULT_LOG_LEVEL,
    DEFAULT_PROVIDER_URL, DEFAULT_REALM,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, SERVICE_NAME};
pub use paths::Paths;
