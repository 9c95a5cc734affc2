/// duochat Client Library
/// Keeps a polled, optimistically mutated local view of a two-party
/// messaging directory

pub mod api;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod mutation;
pub mod preferences;
pub mod remote;
pub mod resource;
pub mod scheduler;

pub use client::{DirectoryClient, Snapshot};
pub use error::{ClientError, ErrorKind, Result};
pub use identity::{ConversationId, ParticipantId};
pub use mutation::{Mutation, MutationOutcome};
pub use remote::{RemoteError, RemoteStore};
pub use resource::{ResourceKey, ResourceValue};
