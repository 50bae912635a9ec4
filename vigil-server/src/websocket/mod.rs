//! WebSocket connection tracking shared by the gateway handlers.

pub mod connection;
pub mod manager;
pub mod messages;

pub use connection::Connection;
pub use manager::ConnectionManager;
pub use messages::{
    ExecutionClientMessage, NotificationClientMessage, ScanClientMessage,
    ServerFrame,
};
