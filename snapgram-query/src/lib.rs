//! Cached queries and invalidating mutations over [`snapgram_appwrite::Api`].
//!
//! Each read is cached under a [`keys::QueryKey`]. Each write, once it
//! succeeded, marks the reads depending on the entities it changed stale;
//! the dependencies are declared in [`invalidation::DEPENDENCIES`].

pub mod cache;
pub mod client;
pub mod error;
pub mod infinite;
pub mod invalidation;
pub mod keys;

pub use cache::{CacheConfig, QueryCache};
pub use client::QueryClient;
pub use error::{QueryError, Result};
