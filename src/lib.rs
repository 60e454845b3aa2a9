//! Pavilion client core
//!
//! Identity and real-time synchronization for the Pavilion cricket
//! community client. Screens and navigation live elsewhere; this crate is
//! the part that has to be right: session lifecycle, the live event
//! channel, and cache reconciliation.
//!
//! # Architecture
//!
//! | Module        | Responsibility                                     |
//! |---------------|----------------------------------------------------|
//! | `credentials` | Durable session/identity token persistence         |
//! | `identity`    | Authentication lifecycle and session freshness     |
//! | `channel`     | One live event channel with bounded reconnection   |
//! | `cache`       | Optimistic per-resource collections                |
//!
//! Components are wired with explicit dependency injection — construct the
//! credential store once, hand it to the session manager, hand both to the
//! channel manager. No ambient globals.
//!
//! ```ignore
//! use std::sync::Arc;
//! use pavilion_client::{
//!     cache::{CacheStore, HttpResourceBackend},
//!     channel::ChannelManager,
//!     credentials::FileCredentialStore,
//!     identity::{HttpSessionBackend, SessionManager},
//!     ClientConfig,
//! };
//!
//! let config = ClientConfig::default();
//! let store = Arc::new(FileCredentialStore::with_default_path()?);
//! let backend = Arc::new(HttpSessionBackend::new(&config.api_url, config.request_timeout));
//! let sessions = Arc::new(SessionManager::new(provider, backend, store.clone()));
//!
//! let resources = Arc::new(HttpResourceBackend::new(
//!     &config.api_url,
//!     config.request_timeout,
//!     store.clone(),
//! ));
//! let cache = Arc::new(CacheStore::new(resources, config.page_size));
//!
//! let channel = Arc::new(ChannelManager::new(config.clone(), store, Some(cache.clone())));
//! channel.arm(sessions.subscribe());
//!
//! sessions.restore().await?;
//! ```

pub mod cache;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;

pub use cache::{CacheEntry, CacheStore, Mutation, MutationHandle, Reconciliation, Resource};
pub use channel::{ChannelManager, ChannelState, ChannelStatus};
pub use config::ClientConfig;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentialSet};
pub use error::{AuthError, CacheError, ChannelError, FetchError, StorageError, ValidationError};
pub use identity::{Registration, Session, SessionManager, SessionPhase, SessionSnapshot};
