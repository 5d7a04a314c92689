//! Remote access to the Appwrite backend.
//!
//! [`service`] declares one trait per backend service so the backend can be
//! injected; [`client::AppwriteClient`] implements them over HTTP and
//! [`api::Api`] builds the application operations on top.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod query;
pub mod record;
pub mod service;

pub use api::Api;
pub use client::AppwriteClient;
pub use config::AppwriteConfig;
pub use error::{AppwriteError, ErrorKind, Result};
pub use service::Backend;
