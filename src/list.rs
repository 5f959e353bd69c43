//! Ordered, randomly-indexable view over the controller's current result
//! set, with a broadcast channel of list updates.

use std::ops::Range;

use smol_str::SmolStr;
use tokio::sync::broadcast;

use crate::store::{Record, RecordId};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// A list change event. `Append` is only emitted when everything before
/// `range.start` is unchanged in identity, content and order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListUpdate {
    Append { range: Range<usize> },
    Reload,
}

/// The single source of truth for every list-oriented consumer and for the
/// search index. Mutated only by the query controller, on the control
/// thread.
#[derive(Debug)]
pub struct RecordList {
    records: Vec<Record>,
    updates: broadcast::Sender<ListUpdate>,
    revision: u64,
}

impl Default for RecordList {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordList {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { records: Vec::new(), updates, revision: 0 }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn indices(&self) -> Range<usize> {
        0..self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    /// Bumped on every mutation; consumers key caches off it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListUpdate> {
        self.updates.subscribe()
    }

    /// Flattened `(id, searchable text)` pairs for the search index.
    pub fn snapshot(&self) -> Vec<(RecordId, SmolStr)> {
        self.records
            .iter()
            .map(|record| (record.id, SmolStr::from(record.searchable_text())))
            .collect()
    }

    pub(crate) fn reload(&mut self, records: Vec<Record>) {
        self.records = records;
        self.revision += 1;
        let _ = self.updates.send(ListUpdate::Reload);
    }

    pub(crate) fn append(&mut self, tail: Vec<Record>) -> Range<usize> {
        let start = self.records.len();
        self.records.extend(tail);
        let range = start..self.records.len();
        self.revision += 1;
        let _ = self.updates.send(ListUpdate::Append { range: range.clone() });
        range
    }
}
