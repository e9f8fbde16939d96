pub mod api;
pub mod config;
pub mod conversations;
pub mod events;
pub mod logging;
pub mod messages;
pub mod session;
pub mod transport;
pub mod types;
