pub mod config;
pub mod error;
pub mod handlers;
pub mod http_server;
pub mod mcp_server;
pub mod models;
pub mod poe;
pub mod session;

pub use self::config::Config;
pub use self::error::ProxyError;
pub use self::handlers::AppState;
