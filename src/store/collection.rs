//! Cached items with their remote sync state.
//!
//! A write is staged in the cache before the remote store is called, then
//! either confirmed or rolled back. Each staged write carries the slot
//! revision it produced so a late rollback never clobbers a newer write.

use serde::Serialize;
use std::fmt::Debug;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Confirmed,
    /// Written locally, remote store has not answered yet
    Pending,
    /// Removal sent, remote store has not answered yet
    PendingDelete,
}

/// A cached item as handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synced<T> {
    #[serde(flatten)]
    pub item: T,
    pub sync: SyncState,
}

impl<T> Synced<T> {
    pub fn confirmed(item: T) -> Self {
        Self {
            item,
            sync: SyncState::Confirmed,
        }
    }
}

pub trait Keyed {
    type Key: PartialEq + Clone + Debug;

    fn key(&self) -> Self::Key;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Front,
    Back,
}

#[derive(Debug)]
enum Change {
    Upsert,
    Remove,
}

/// Undo information for one staged write.
#[derive(Debug)]
pub struct Staged<T: Keyed> {
    key: T::Key,
    revision: u64,
    change: Change,
    previous: Option<(T, SyncState)>,
}

#[derive(Debug)]
struct Slot<T> {
    item: T,
    sync: SyncState,
    revision: u64,
}

#[derive(Debug)]
pub struct Collection<T: Keyed> {
    slots: Vec<Slot<T>>,
    next_revision: u64,
}

impl<T: Keyed> Default for Collection<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_revision: 1,
        }
    }
}

impl<T: Keyed + Clone> Collection<T> {
    fn bump(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        self.slots.iter().position(|s| &s.item.key() == key)
    }

    /// Replaces the whole collection with remote-confirmed items.
    ///
    /// Slots with a write still in flight are kept, revision included, so the
    /// pending confirm or rollback still applies to them.
    pub fn replace_all(&mut self, items: Vec<T>) {
        let (mut in_flight, _): (Vec<Slot<T>>, Vec<Slot<T>>) = std::mem::take(&mut self.slots)
            .into_iter()
            .partition(|s| s.sync != SyncState::Confirmed);

        let mut slots: Vec<Slot<T>> = Vec::with_capacity(items.len() + in_flight.len());
        for item in items {
            let key = item.key();
            // duplicate keys from the remote sheet collapse to the last row
            if let Some(i) = slots.iter().position(|s| s.item.key() == key) {
                if slots[i].sync != SyncState::Confirmed {
                    continue;
                }
                slots.remove(i);
            }
            let slot = match in_flight.iter().position(|s| s.item.key() == key) {
                Some(i) => in_flight.remove(i),
                None => Slot {
                    item,
                    sync: SyncState::Confirmed,
                    revision: self.bump(),
                },
            };
            slots.push(slot);
        }
        slots.append(&mut in_flight);
        self.slots = slots;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, key: &T::Key) -> Option<&T> {
        self.slots.iter().find(|s| &s.item.key() == key).map(|s| &s.item)
    }

    pub fn get(&self, key: &T::Key) -> Option<Synced<T>> {
        self.slots
            .iter()
            .find(|s| &s.item.key() == key)
            .map(|s| Synced {
                item: s.item.clone(),
                sync: s.sync,
            })
    }

    pub fn list(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<Synced<T>> {
        self.slots
            .iter()
            .filter(|s| keep(&s.item))
            .map(|s| Synced {
                item: s.item.clone(),
                sync: s.sync,
            })
            .collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(|s| &s.item)
    }

    /// Inserts or replaces an item known only locally.
    pub fn stage_upsert(&mut self, item: T, at: Insert) -> Staged<T> {
        let key = item.key();
        let revision = self.bump();
        let previous = match self.position(&key) {
            Some(i) => {
                let slot = &mut self.slots[i];
                let old_item = std::mem::replace(&mut slot.item, item);
                let old_sync = std::mem::replace(&mut slot.sync, SyncState::Pending);
                slot.revision = revision;
                Some((old_item, old_sync))
            }
            None => {
                let slot = Slot {
                    item,
                    sync: SyncState::Pending,
                    revision,
                };
                match at {
                    Insert::Front => self.slots.insert(0, slot),
                    Insert::Back => self.slots.push(slot),
                }
                None
            }
        };

        Staged {
            key,
            revision,
            change: Change::Upsert,
            previous,
        }
    }

    /// Marks an item as being deleted. `None` when the key is unknown.
    pub fn stage_remove(&mut self, key: &T::Key) -> Option<Staged<T>> {
        let i = self.position(key)?;
        let revision = self.bump();
        let slot = &mut self.slots[i];
        let previous_sync = std::mem::replace(&mut slot.sync, SyncState::PendingDelete);
        slot.revision = revision;

        Some(Staged {
            key: key.clone(),
            revision,
            change: Change::Remove,
            previous: Some((slot.item.clone(), previous_sync)),
        })
    }

    /// Applies a remote-confirmed item without a staging round.
    pub fn upsert_confirmed(&mut self, item: T, at: Insert) {
        let staged = self.stage_upsert(item, at);
        self.confirm(&staged);
    }

    pub fn confirm(&mut self, staged: &Staged<T>) {
        let Some(i) = self.position(&staged.key) else {
            return;
        };
        if self.slots[i].revision != staged.revision {
            return;
        }
        match staged.change {
            Change::Upsert => self.slots[i].sync = SyncState::Confirmed,
            Change::Remove => {
                self.slots.remove(i);
            }
        }
    }

    pub fn rollback(&mut self, staged: Staged<T>) {
        let Some(i) = self.position(&staged.key) else {
            return;
        };
        if self.slots[i].revision != staged.revision {
            return;
        }
        match staged.previous {
            Some((item, sync)) => {
                let revision = self.bump();
                let slot = &mut self.slots[i];
                slot.item = item;
                slot.sync = sync;
                slot.revision = revision;
            }
            None => {
                self.slots.remove(i);
            }
        }
    }
}

/// A single cached value (settings, categories) with the same staging rules.
#[derive(Debug)]
pub struct Single<T> {
    value: T,
    sync: SyncState,
    revision: u64,
}

/// Undo information for a staged [`Single`] write.
#[derive(Debug)]
pub struct StagedValue<T> {
    revision: u64,
    previous: (T, SyncState),
}

impl<T: Clone> Single<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            sync: SyncState::Confirmed,
            revision: 0,
        }
    }

    pub fn get(&self) -> Synced<T> {
        Synced {
            item: self.value.clone(),
            sync: self.sync,
        }
    }

    /// Takes a remote-confirmed value unless a local write is in flight.
    pub fn replace(&mut self, value: T) {
        if self.sync != SyncState::Confirmed {
            return;
        }
        self.value = value;
        self.revision += 1;
    }

    pub fn stage(&mut self, value: T) -> StagedValue<T> {
        self.revision += 1;
        let previous = (
            std::mem::replace(&mut self.value, value),
            std::mem::replace(&mut self.sync, SyncState::Pending),
        );
        StagedValue {
            revision: self.revision,
            previous,
        }
    }

    pub fn confirm(&mut self, staged: &StagedValue<T>) {
        if self.revision == staged.revision {
            self.sync = SyncState::Confirmed;
        }
    }

    pub fn rollback(&mut self, staged: StagedValue<T>) {
        if self.revision == staged.revision {
            (self.value, self.sync) = staged.previous;
            self.revision += 1;
        }
    }
}
