// Append-only ledger
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::entry::AuditEntry;
use crate::error::Result;

/// Append-only action ledger keyed by preauth request id
///
/// Implementations never update or delete an entry once appended.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry, returning it with its assigned sequence number
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry>;

    /// All entries for one request in append order
    async fn trail(&self, preauth_request_id: Uuid) -> Result<Vec<AuditEntry>>;
}

/// In-process ledger
///
/// Cloning shares the underlying storage. [`InMemoryAuditLog::record`] is
/// synchronous so a store can append inside the same critical section that
/// mutates the request it describes.
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append synchronously; sequence numbers start at 1
    pub fn record(&self, mut entry: AuditEntry) -> AuditEntry {
        let mut entries = self.entries.write();
        entry.sequence = i64::try_from(entries.len()).unwrap_or(i64::MAX - 1) + 1;
        log_entry(&entry);
        entries.push(entry.clone());
        entry
    }

    pub fn entries_for(&self, preauth_request_id: Uuid) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.preauth_request_id == preauth_request_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry> {
        Ok(self.record(entry))
    }

    async fn trail(&self, preauth_request_id: Uuid) -> Result<Vec<AuditEntry>> {
        Ok(self.entries_for(preauth_request_id))
    }
}

/// Mirror an entry to the `audit` tracing target
pub fn log_entry(entry: &AuditEntry) {
    info!(
        target: "audit",
        request_id = %entry.preauth_request_id,
        action = %entry.action,
        actor = entry.actor.actor_type.as_str(),
        success = entry.success,
        from = ?entry.from_status,
        to = ?entry.to_status,
        "Preauth audit entry"
    );
}
