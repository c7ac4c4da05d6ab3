//! Server and account configuration.
//!
//! [`ServerSettings`] describes one server endpoint together with the
//! credentials used against it. [`AccountConfig`] groups the incoming and
//! outgoing servers with the per-account sync, pool and timeout settings
//! that the runner reads from its JSON configuration file.

mod model;
mod validation;

pub use model::{AccountConfig, OAuthConfig, Protocol, ServerSettings, ServerSettingsMapper};
pub use validation::{ValidationError, validate_account, validate_server};
