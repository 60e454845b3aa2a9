//! Client cache synchronization
//!
//! | Module     | Responsibility                                       |
//! |------------|------------------------------------------------------|
//! | `resource` | Resource identities, items, pages                    |
//! | `rest`     | Paginated fetching over REST                         |
//! | `store`    | Optimistic mutation, reconciliation, push merge      |
//!
//! Caches are rebuilt from the network on cold start; nothing here
//! persists across process restarts.

pub mod resource;
pub mod rest;
pub mod store;

pub use resource::{Page, Resource, ResourceItem};
pub use rest::{HttpResourceBackend, ResourceBackend};
pub use store::{CacheEntry, CacheStore, Mutation, MutationHandle, Reconciliation};
