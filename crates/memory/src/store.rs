use std::collections::HashMap;

use uuid::Uuid;

use crate::schema::MemoryEntry;

/// In-memory index over the live memory set. The event log ([`crate::event_log`])
/// is the durable source of truth; this is rebuilt from it at startup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<MemoryEntry>,
    by_id: HashMap<Uuid, usize>,
    by_fingerprint: HashMap<String, Uuid>,
}

impl MemoryStore {
    /// Insert a new entry. Returns `false` without modifying the store if an
    /// entry with the same fingerprint already exists — callers should use
    /// [`MemoryStore::upsert_by_fingerprint`] for add/update semantics.
    pub fn insert(&mut self, entry: MemoryEntry) -> bool {
        if self.by_fingerprint.contains_key(&entry.fingerprint) {
            return false;
        }
        self.by_fingerprint.insert(entry.fingerprint.clone(), entry.id);
        self.by_id.insert(entry.id, self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Insert `entry` if no item shares its fingerprint, otherwise replace
    /// the existing one's mutable fields in place (keeping its id and
    /// `created_at`). Returns the id of the live entry either way.
    pub fn upsert_by_fingerprint(&mut self, mut entry: MemoryEntry) -> Uuid {
        if let Some(&existing_id) = self.by_fingerprint.get(&entry.fingerprint) {
            if let Some(&idx) = self.by_id.get(&existing_id) {
                let existing = &mut self.entries[idx];
                entry.id = existing.id;
                entry.created_at = existing.created_at;
                *existing = entry;
                return existing_id;
            }
        }
        let id = entry.id;
        self.by_fingerprint.insert(entry.fingerprint.clone(), id);
        self.by_id.insert(id, self.entries.len());
        self.entries.push(entry);
        id
    }

    pub fn all(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: Uuid) -> Option<&MemoryEntry> {
        self.by_id.get(&id).and_then(|&i| self.entries.get(i))
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut MemoryEntry> {
        let idx = *self.by_id.get(&id)?;
        self.entries.get_mut(idx)
    }

    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<&MemoryEntry> {
        let id = self.by_fingerprint.get(fingerprint)?;
        self.get(*id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole store with a rebuilt set (used when reloading from
    /// the event log at startup).
    pub fn reset(&mut self, entries: Vec<MemoryEntry>) {
        self.by_id.clear();
        self.by_fingerprint.clear();
        self.entries = entries;
        for (idx, entry) in self.entries.iter().enumerate() {
            self.by_id.insert(entry.id, idx);
            self.by_fingerprint.insert(entry.fingerprint.clone(), entry.id);
        }
    }

    /// Drop every tombstoned entry (`ttl_days == 0`) whose age exceeds
    /// `grace_days`. Returns how many were removed.
    pub fn sweep_tombstones(&mut self, grace_days: i64) -> usize {
        let now = chrono::Utc::now();
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !(entry.is_tombstoned() && (now - entry.created_at).num_days() >= grace_days)
        });
        self.rebuild_indices();
        before - self.entries.len()
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() < before;
        if removed {
            self.rebuild_indices();
        }
        removed
    }

    fn rebuild_indices(&mut self) {
        self.by_id = self.entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        self.by_fingerprint = self.entries.iter().map(|e| (e.fingerprint.clone(), e.id)).collect();
    }
}
