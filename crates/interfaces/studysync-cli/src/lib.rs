pub mod commands;
pub mod connection;

pub use connection::{local_store, Connection, ConnectionArgs};
