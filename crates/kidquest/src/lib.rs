//! # kidquest
//!
//! Authenticated HTTP client for the kidquest missions and rewards backend.
//!
//! The client wraps every call in the same pipeline:
//!
//! - a connectivity check, failing fast with `NetworkError` when offline
//! - the stored bearer token, attached unless the request opts out
//! - exponential-backoff retries for server errors, timeouts and transport
//!   failures
//! - on a 401, one coordinated token refresh shared by every concurrent
//!   caller, then a single replay of the original request
//!
//! Failures are normalized into [`ApiError`], tagged with an [`ErrorKind`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kidquest::{ApiClient, AuthEvent, ClientConfig, Credentials, FileStorage, TokenStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder("https://api.kidquest.app")
//!     .retries(3)
//!     .build()?;
//! let store = TokenStore::new(Arc::new(FileStorage::new("session.json")));
//! let client = ApiClient::new(config, Arc::new(store))?;
//!
//! let mut events = client.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if event == AuthEvent::Logout {
//!             println!("session ended, please sign in again");
//!         }
//!     }
//! });
//!
//! client.login(&Credentials::new("parent@example.com", "hunter2")).await?;
//! let missions: serde_json::Value = client.get_json("/missions").await?;
//! println!("{}", missions);
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! Tokens live in a [`TokenStore`] over any [`KeyValueStorage`] backend.
//! Storage failures are logged and never fail a request; the store keeps
//! working from memory.

pub mod auth;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod types;

pub use auth::{AccessToken, AuthEvent, Credentials, RefreshToken, Registration, TokenPair};
pub use client::{ApiClient, ApiClientBuilder, UPLOAD_TIMEOUT};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connectivity::{AlwaysOnline, ConnectivityProbe, StaticProbe, TcpProbe};
pub use error::{ApiError, ConfigError, ErrorKind, StorageError};
pub use http::{RequestDescriptor, ResponseBody, UploadForm};
pub use refresh::RefreshCoordinator;
pub use retry::RetryPolicy;
pub use store::{FileStorage, KeyValueStorage, MemoryStorage, TokenStore};
pub use types::BaseUrl;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
