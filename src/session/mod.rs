// Module for shared connection management
pub mod connection_manager;

pub use connection_manager::{ConnectionManager, ConnectionRef};
