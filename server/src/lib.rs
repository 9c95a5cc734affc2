/// duochat directory server library.
/// In-memory reference implementation of the conversation directory that
/// duochat clients poll and mutate over HTTP.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod store;

pub use error::{StoreError, StoreResult};
