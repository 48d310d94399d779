use crate::db::Row;
use crate::error::{BrowseError, Result};
use std::collections::HashMap;
use std::fmt;

/// Opaque reference to one row of the current view.
///
/// Slots count from 0 in arrival order within a view. The generation changes on
/// every reset, so a handle from an earlier view never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle {
    generation: u64,
    slot: usize,
}

impl RowHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.slot)
    }
}

/// Maps row handles to the row values last known to be in the store.
///
/// Those values are the only way to address a row for update or delete, since no
/// primary key or rowid is assumed.
#[derive(Debug, Default)]
pub struct RowIdentityMap {
    generation: u64,
    next_slot: usize,
    rows: HashMap<RowHandle, Row>,
}

impl RowIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every binding. Handles issued so far become unknown.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.next_slot = 0;
        self.rows.clear();
    }

    pub fn bind(&mut self, row: Row) -> RowHandle {
        let handle = RowHandle {
            generation: self.generation,
            slot: self.next_slot,
        };
        self.next_slot += 1;
        self.rows.insert(handle, row);
        handle
    }

    pub fn lookup(&self, handle: RowHandle) -> Result<&Row> {
        self.rows
            .get(&handle)
            .ok_or(BrowseError::UnknownHandle(handle))
    }

    /// Replaces the snapshot for `handle` after the store accepted an edit.
    pub fn rebind(&mut self, handle: RowHandle, row: Row) -> Result<()> {
        match self.rows.get_mut(&handle) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(BrowseError::UnknownHandle(handle)),
        }
    }

    pub fn remove(&mut self, handle: RowHandle) -> Result<Row> {
        self.rows
            .remove(&handle)
            .ok_or(BrowseError::UnknownHandle(handle))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
