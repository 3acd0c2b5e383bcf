pub mod keys;
pub mod postgrest;

pub use postgrest::{Filter, HttpError, PostgrestClient, PostgrestConfig};
