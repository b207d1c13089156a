//! Conversation identity to display label mapping.
//!
//! Storage is not this crate's business: the directory only reads and
//! writes through an injected [`LabelStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use palaver_core::ConversationId;
use tracing::{info, warn};

use crate::manager::lock;

pub type Labels = BTreeMap<ConversationId, String>;

/// Load/save pair backing a [`TenantDirectory`].
pub trait LabelStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Labels>;
    fn save(&self, labels: &Labels) -> anyhow::Result<()>;
}

pub struct TenantDirectory {
    store: Box<dyn LabelStore>,
    labels: Mutex<Labels>,
}

impl TenantDirectory {
    /// Load existing labels. A store that cannot be read starts empty.
    pub fn open(store: impl LabelStore + 'static) -> Self {
        let labels = match store.load() {
            Ok(labels) => {
                info!("Loaded {} tenant labels", labels.len());
                labels
            }
            Err(e) => {
                warn!("Could not load tenant labels: {e:#}. Starting with none.");
                Labels::new()
            }
        };
        Self {
            store: Box::new(store),
            labels: Mutex::new(labels),
        }
    }

    #[must_use]
    pub fn label(&self, id: &ConversationId) -> Option<String> {
        lock(&self.labels).get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &ConversationId) -> bool {
        lock(&self.labels).contains_key(id)
    }

    /// Record a label and persist the whole mapping.
    ///
    /// If saving fails the in-memory label is rolled back.
    pub fn register(&self, id: &ConversationId, label: &str) -> anyhow::Result<()> {
        let mut labels = lock(&self.labels);
        let previous = labels.insert(id.clone(), label.to_string());
        if let Err(e) = self.store.save(&labels) {
            match previous {
                Some(old) => labels.insert(id.clone(), old),
                None => labels.remove(id),
            };
            return Err(e);
        }
        info!("Registered tenant {id} as {label:?}");
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> Labels {
        lock(&self.labels).clone()
    }
}
