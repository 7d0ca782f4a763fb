//! Session persistence.
//!
//! [`TokenStore`] is the only component that touches persisted session
//! state. It sits on top of a [`KeyValueStorage`] backend and never fails:
//! backend errors are logged and the store keeps working from memory.

mod file;
mod memory;
mod token_store;

use async_trait::async_trait;

use crate::error::StorageError;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use token_store::TokenStore;

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key for the cached user profile.
pub const USER_DATA_KEY: &str = "user_data";

/// Persistent string key-value storage.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read a value, `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any existing one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
