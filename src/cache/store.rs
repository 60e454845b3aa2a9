//! Cache store with optimistic mutation and reconciliation
//!
//! One entry per resource collection, keyed by item id. User actions
//! mutate the local entry synchronously before their network call is made,
//! and every mutation is later reconciled with the server's answer or
//! rolled back to its exact pre-mutation snapshot.
//!
//! # Invariants
//!
//! - Item ids are unique within a collection.
//! - An item under an in-flight mutation stays present in the collection
//!   for the life of that mutation: created synthetically for creates,
//!   never removed early for deletes.
//! - One in-flight mutation per `(resource, item)` key; a second is
//!   rejected, not interleaved.
//! - A failed fetch leaves the existing entry untouched — stale-but-present
//!   beats an empty screen.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::resource::{Resource, ResourceItem};
use super::rest::ResourceBackend;
use crate::error::{CacheError, FetchError};

/// One cached collection.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Server order preserved; pushed items are inserted at the front.
    pub items: Vec<ResourceItem>,
    pub page: u32,
    pub has_more: bool,
    pub last_synced_at: Option<chrono::DateTime<Utc>>,
    pending: HashMap<String, PendingMutation>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            // Nothing fetched yet, so there is more to fetch.
            has_more: true,
            last_synced_at: None,
            pending: HashMap::new(),
        }
    }
}

impl CacheEntry {
    pub fn item(&self, id: &str) -> Option<&ResourceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Update,
    Create,
    Delete,
}

#[derive(Debug, Clone)]
struct PendingMutation {
    handle_id: Uuid,
    kind: MutationKind,
    /// Pre-mutation copy, restored verbatim on rollback. Absent for
    /// creates, which roll back by removal.
    snapshot: Option<ResourceItem>,
}

/// Optimistic local change to one cached item.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Shallow-merge these fields into the item body (flip a flag, bump a
    /// count).
    Merge(Map<String, Value>),
    /// Insert this synthetic item ahead of server confirmation.
    Create(ResourceItem),
    /// Mark for deletion; the item stays visible until the server confirms.
    Delete,
}

/// Identifies one in-flight mutation. Consumed by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationHandle {
    id: Uuid,
    resource: Resource,
    item_id: String,
}

impl MutationHandle {
    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// Settled outcome of a mutation's network call.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    /// Server confirmed. When it returned the mutated item, that copy is
    /// authoritative — counts are replaced, never merged, so concurrent
    /// mutations by other users cannot drift the cache.
    Confirmed(Option<ResourceItem>),
    /// Server rejected; the optimistic change rolls back.
    Rejected,
}

/// Per-resource cache with optimistic mutation and push-driven merge.
pub struct CacheStore {
    backend: Arc<dyn ResourceBackend>,
    page_size: usize,
    entries: Mutex<HashMap<Resource, CacheEntry>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn ResourceBackend>, page_size: usize) -> Self {
        Self {
            backend,
            page_size,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A copy of the current entry, if one exists.
    pub async fn entry(&self, resource: Resource) -> Option<CacheEntry> {
        self.entries.lock().await.get(&resource).cloned()
    }

    /// Fetch a page. `refresh` (or page 1) replaces the collection
    /// wholesale; later pages append. A failed fetch returns the error and
    /// leaves the entry exactly as it was.
    pub async fn fetch(
        &self,
        resource: Resource,
        page: u32,
        refresh: bool,
    ) -> Result<CacheEntry, FetchError> {
        let fetched = self.backend.fetch_page(resource, page, self.page_size).await?;
        let full_page = fetched.items.len() >= self.page_size;

        let mut entries = self.entries.lock().await;
        let entry = entries.entry(resource).or_default();

        if refresh || page <= 1 {
            let mut items = fetched.items;
            // Items under an in-flight mutation keep their local state
            // until reconciliation settles them.
            for id in entry.pending.keys() {
                if let Some(local) = entry.items.iter().find(|item| &item.id == id) {
                    match items.iter_mut().find(|item| &item.id == id) {
                        Some(slot) => *slot = local.clone(),
                        None => items.insert(0, local.clone()),
                    }
                }
            }
            entry.items = items;
        } else {
            for item in fetched.items {
                if entry.pending.contains_key(&item.id) {
                    continue;
                }
                match entry.items.iter_mut().find(|existing| existing.id == item.id) {
                    Some(slot) => *slot = item,
                    None => entry.items.push(item),
                }
            }
        }

        entry.page = page;
        entry.has_more = fetched.has_more.unwrap_or(full_page);
        entry.last_synced_at = Some(Utc::now());

        debug!(
            resource = %resource,
            page,
            count = entry.items.len(),
            has_more = entry.has_more,
            "cache entry synced"
        );
        Ok(entry.clone())
    }

    /// Apply a local mutation before its network call is made, so the UI
    /// reflects intent immediately. Rejects a second mutation on the same
    /// key while one is in flight.
    pub async fn apply_optimistic(
        &self,
        resource: Resource,
        item_id: &str,
        mutation: Mutation,
    ) -> Result<MutationHandle, CacheError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(resource).or_default();

        if entry.pending.contains_key(item_id) {
            return Err(CacheError::MutationInFlight {
                resource: resource.path(),
                item_id: item_id.to_string(),
            });
        }

        let (kind, snapshot) = match mutation {
            Mutation::Merge(fields) => {
                let item = entry
                    .items
                    .iter_mut()
                    .find(|item| item.id == item_id)
                    .ok_or_else(|| CacheError::UnknownItem {
                        resource: resource.path(),
                        item_id: item_id.to_string(),
                    })?;
                let snapshot = item.clone();
                for (key, value) in fields {
                    item.body.insert(key, value);
                }
                (MutationKind::Update, Some(snapshot))
            }
            Mutation::Create(item) => {
                if item.id != item_id {
                    return Err(CacheError::IdMismatch {
                        expected: item_id.to_string(),
                        actual: item.id,
                    });
                }
                entry.items.insert(0, item);
                (MutationKind::Create, None)
            }
            Mutation::Delete => {
                let snapshot = entry
                    .items
                    .iter()
                    .find(|item| item.id == item_id)
                    .cloned()
                    .ok_or_else(|| CacheError::UnknownItem {
                        resource: resource.path(),
                        item_id: item_id.to_string(),
                    })?;
                (MutationKind::Delete, Some(snapshot))
            }
        };

        let handle = MutationHandle {
            id: Uuid::new_v4(),
            resource,
            item_id: item_id.to_string(),
        };
        entry.pending.insert(
            item_id.to_string(),
            PendingMutation {
                handle_id: handle.id,
                kind,
                snapshot,
            },
        );
        debug!(resource = %resource, item_id = %item_id, "optimistic mutation applied");
        Ok(handle)
    }

    /// Settle a mutation with its network outcome. Confirmation installs
    /// the server's copy (or completes the delete); rejection restores the
    /// exact pre-mutation state.
    pub async fn reconcile(&self, handle: MutationHandle, outcome: Reconciliation) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&handle.resource) else {
            warn!(resource = %handle.resource, "reconcile against missing cache entry");
            return;
        };

        match entry.pending.get(&handle.item_id) {
            Some(pending) if pending.handle_id == handle.id => {}
            Some(_) => {
                warn!(item_id = %handle.item_id, "stale mutation handle, ignoring");
                return;
            }
            None => {
                warn!(item_id = %handle.item_id, "no pending mutation for handle");
                return;
            }
        }
        let pending = match entry.pending.remove(&handle.item_id) {
            Some(pending) => pending,
            None => return,
        };

        match outcome {
            Reconciliation::Confirmed(server_item) => match pending.kind {
                MutationKind::Delete => {
                    entry.items.retain(|item| item.id != handle.item_id);
                    debug!(item_id = %handle.item_id, "delete confirmed");
                }
                MutationKind::Update | MutationKind::Create => {
                    if let Some(server_item) = server_item {
                        match entry.items.iter_mut().find(|item| item.id == handle.item_id) {
                            Some(slot) => *slot = server_item,
                            None => entry.items.insert(0, server_item),
                        }
                    }
                    debug!(item_id = %handle.item_id, "mutation confirmed");
                }
            },
            Reconciliation::Rejected => match pending.kind {
                MutationKind::Create => {
                    entry.items.retain(|item| item.id != handle.item_id);
                    debug!(item_id = %handle.item_id, "create rolled back");
                }
                MutationKind::Update | MutationKind::Delete => {
                    if let Some(snapshot) = pending.snapshot {
                        if let Some(slot) =
                            entry.items.iter_mut().find(|item| item.id == handle.item_id)
                        {
                            *slot = snapshot;
                        }
                    }
                    debug!(item_id = %handle.item_id, "mutation rolled back");
                }
            },
        }
    }

    /// Merge a pushed update. Last-write-wins by server timestamp, never by
    /// arrival order, so an out-of-order stale push cannot overwrite a
    /// newer value. Items under an in-flight mutation are skipped —
    /// reconciliation is authoritative for them.
    pub async fn apply_push(&self, resource: Resource, item: ResourceItem) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(resource).or_default();

        if entry.pending.contains_key(&item.id) {
            debug!(resource = %resource, item_id = %item.id, "push skipped, mutation in flight");
            return;
        }

        match entry.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                if item.updated_at > existing.updated_at {
                    *existing = item;
                } else {
                    debug!(resource = %resource, item_id = %item.id, "stale push dropped");
                }
            }
            None => entry.items.insert(0, item),
        }
    }
}
