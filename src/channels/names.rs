//! Guild and channel display-name resolution with a process-wide cache.
//!
//! Names are only needed for the allow-list and for logs, so a lookup that
//! fails falls back to the numeric id instead of failing the message.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::logging::targets;

/// What the platform gave us for an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    /// The name arrived with the event.
    Cached { id: u64, name: String },
    /// Only the id is known; the name must be fetched.
    Fetchable { id: u64 },
}

impl NameSource {
    pub fn id(&self) -> u64 {
        match self {
            NameSource::Cached { id, .. } | NameSource::Fetchable { id } => *id,
        }
    }
}

/// Fetches a display name from the platform.
#[async_trait]
pub trait NameFetcher: Send + Sync {
    async fn fetch_name(&self, id: u64) -> Option<String>;
}

/// id → display name, shared by all handlers.
///
/// Two handlers may race on the same uncached id and both fetch it. Names
/// are stable, so the second insert just overwrites with the same value.
#[derive(Debug, Default)]
pub struct NameCache {
    names: RwLock<HashMap<u64, String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a name, consulting the cache before fetching.
    ///
    /// Returns the id as a string when the fetch fails.
    pub async fn resolve(&self, source: NameSource, fetcher: &dyn NameFetcher) -> String {
        match source {
            NameSource::Cached { id, name } => {
                self.insert(id, name.clone()).await;
                name
            }
            NameSource::Fetchable { id } => {
                if let Some(name) = self.get(&id).await {
                    return name;
                }
                match fetcher.fetch_name(id).await {
                    Some(name) => {
                        self.insert(id, name.clone()).await;
                        name
                    }
                    None => {
                        tracing::debug!(target: targets::BOBBIN, id, "Name lookup failed");
                        id.to_string()
                    }
                }
            }
        }
    }

    async fn get(&self, id: &u64) -> Option<String> {
        self.names.read().await.get(id).cloned()
    }

    async fn insert(&self, id: u64, name: String) {
        self.names.write().await.insert(id, name);
    }
}
