//! Record data model and the in-memory record store collaborator.

use std::convert::Infallible;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::criteria::NativePredicate;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Store-assigned record identity. Totally ordered by assignment order,
/// never by content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId(pub u64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    Message {
        level: LogLevel,
        label: String,
        text: String,
    },
    Network {
        method: String,
        url: String,
        host: Option<String>,
        status: Option<u16>,
        duration_ms: Option<u64>,
        content_type: Option<String>,
        request_headers: String,
        response_headers: String,
        body: Option<String>,
        state: TaskState,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub session: Uuid,
    pub pinned: bool,
    pub body: RecordBody,
}

impl Record {
    pub fn level(&self) -> Option<LogLevel> {
        match &self.body {
            RecordBody::Message { level, .. } => Some(*level),
            RecordBody::Network { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        match &self.body {
            RecordBody::Message { level, .. } => *level >= LogLevel::Error,
            RecordBody::Network { status, state, .. } => {
                *state == TaskState::Failed || status.is_some_and(|code| code >= 400)
            }
        }
    }

    /// Flattened text the search index snapshots for this record.
    pub fn searchable_text(&self) -> String {
        match &self.body {
            RecordBody::Message { label, text, .. } => format!("{label} {text}"),
            RecordBody::Network {
                method,
                url,
                request_headers,
                response_headers,
                body,
                ..
            } => {
                let mut out = format!("{method} {url} {request_headers} {response_headers}");
                if let Some(body) = body {
                    out.push(' ');
                    out.push_str(body);
                }
                out
            }
        }
    }
}

/// Record contents before the store assigns identity.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub created_at: DateTime<Utc>,
    pub session: Uuid,
    pub body: RecordBody,
}

impl RecordDraft {
    pub fn message(
        created_at: DateTime<Utc>,
        level: LogLevel,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            created_at,
            session: Uuid::nil(),
            body: RecordBody::Message { level, label: label.into(), text: text.into() },
        }
    }

    pub fn network(
        created_at: DateTime<Utc>,
        method: impl Into<String>,
        url: impl Into<String>,
        host: Option<String>,
    ) -> Self {
        Self {
            created_at,
            session: Uuid::nil(),
            body: RecordBody::Network {
                method: method.into(),
                url: url.into(),
                host,
                status: None,
                duration_ms: None,
                content_type: None,
                request_headers: String::new(),
                response_headers: String::new(),
                body: None,
                state: TaskState::Pending,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreatedAscending,
    CreatedDescending,
}

/// One store change notification: indices into the store's own ordering.
/// Insertion and update indices are post-change, deletion indices are
/// pre-change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub insertions: Vec<usize>,
    pub updates: Vec<usize>,
    pub deletions: Vec<usize>,
}

impl ChangeBatch {
    pub fn is_pure_insert(&self) -> bool {
        !self.insertions.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }
}

/// Query capability the live query controller needs from a store.
pub trait RecordQuery {
    type Error: std::error::Error;

    fn fetch(
        &self,
        predicate: &NativePredicate,
        sort: SortOrder,
    ) -> Result<Vec<Record>, Self::Error>;

    /// Record at a store-order index, post-change.
    fn record_at(&self, index: usize) -> Option<Record>;

    fn count(&self) -> usize;
}

/// In-memory record store. Keeps records ordered by `(created_at, id)` and
/// broadcasts a [`ChangeBatch`] for every mutation.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<Record>,
    next_id: u64,
    changes: broadcast::Sender<ChangeBatch>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { records: Vec::new(), next_id: 1, changes }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn insert(&mut self, draft: RecordDraft) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        let record = Record {
            id,
            created_at: draft.created_at,
            session: draft.session,
            pinned: false,
            body: draft.body,
        };
        let at = self
            .records
            .partition_point(|existing| (existing.created_at, existing.id) <= (record.created_at, record.id));
        self.records.insert(at, record);
        let _ = self.changes.send(ChangeBatch { insertions: vec![at], ..Default::default() });
        id
    }

    /// Mutate a record in place. Callers must not rewrite `created_at`; the
    /// store's ordering is keyed on it.
    pub fn update(&mut self, id: RecordId, mutate: impl FnOnce(&mut Record)) -> bool {
        let Some(at) = self.records.iter().position(|record| record.id == id) else {
            return false;
        };
        mutate(&mut self.records[at]);
        let _ = self.changes.send(ChangeBatch { updates: vec![at], ..Default::default() });
        true
    }

    pub fn set_pinned(&mut self, id: RecordId, pinned: bool) -> bool {
        self.update(id, |record| record.pinned = pinned)
    }

    /// Transition a pending network record to completed.
    pub fn complete_network(
        &mut self,
        id: RecordId,
        status: u16,
        duration_ms: u64,
        response_body: Option<String>,
    ) -> bool {
        self.update(id, |record| {
            if let RecordBody::Network { status: slot, duration_ms: duration, body, state, .. } =
                &mut record.body
            {
                *slot = Some(status);
                *duration = Some(duration_ms);
                *body = response_body;
                *state = if status >= 400 { TaskState::Failed } else { TaskState::Completed };
            }
        })
    }

    /// Bulk clear. Emits one batch whose deletions cover the prior set.
    pub fn remove_all(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let deletions = (0..self.records.len()).collect();
        self.records.clear();
        let _ = self.changes.send(ChangeBatch { deletions, ..Default::default() });
    }
}

impl RecordQuery for RecordStore {
    type Error = Infallible;

    fn fetch(
        &self,
        predicate: &NativePredicate,
        sort: SortOrder,
    ) -> Result<Vec<Record>, Self::Error> {
        let mut out: Vec<Record> =
            self.records.iter().filter(|record| predicate.matches(record)).cloned().collect();
        if sort == SortOrder::CreatedDescending {
            out.reverse();
        }
        Ok(out)
    }

    fn record_at(&self, index: usize) -> Option<Record> {
        self.records.get(index).cloned()
    }

    fn count(&self) -> usize {
        self.records.len()
    }
}
