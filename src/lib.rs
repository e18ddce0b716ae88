//! Transit planner client core.
//!
//! The UI thread never touches the routing engine directly. Requests go
//! through an [`channel::AsyncChannel`] to a web worker, where the engine is
//! built once by a [`single_flight::SingleFlight`] and repeated queries are
//! answered from a [`query_cache::QueryResultCache`]. On the UI side,
//! [`resource::ResourceCache`] turns those calls into values that components
//! read synchronously, suspending while a value is still on its way.

pub mod assets;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod query_cache;
pub mod resource;
pub mod service;
pub mod single_flight;
pub mod worker_agent;

pub use client::PlannerClient;
pub use error::PlannerError;
pub use resource::{ReadError, Resource, ResourceCache, ResourceKey};
