//! tagsync client - remote store access.

pub mod auth;
pub mod config;
pub mod http;
pub mod store;
pub mod types;

pub use auth::{AuthProvider, StaticCredentials};
pub use config::{AuthConfig, ClientConfig, ConfigError};
pub use http::HttpTagStore;
pub use store::TagStore;
pub use types::ConflictsReply;
