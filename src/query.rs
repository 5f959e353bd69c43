//! Live query controller: owns the store subscription's change handling,
//! re-runs the compiled criteria, and classifies each batch as a pure tail
//! append or a general reload.

use thiserror::Error;
use tracing::{debug, warn};

use crate::criteria::{compile, CompiledCriteria, CriteriaError, FilterCriteria};
use crate::list::{ListUpdate, RecordList};
use crate::store::{ChangeBatch, Record, RecordQuery, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Criteria(#[from] CriteriaError),
    #[error("store query failed: {0}")]
    Store(String),
}

/// Control-thread owner of one live query. All entry points must be called
/// from the thread that owns the record list.
#[derive(Debug)]
pub struct QueryController {
    criteria: FilterCriteria,
    compiled: Option<CompiledCriteria>,
    sort: SortOrder,
    state: RefreshState,
    list: RecordList,
    store_count: usize,
    last_error: Option<String>,
}

impl Default for QueryController {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryController {
    pub fn new() -> Self {
        Self {
            criteria: FilterCriteria::default(),
            compiled: None,
            sort: SortOrder::default(),
            state: RefreshState::default(),
            list: RecordList::new(),
            store_count: 0,
            last_error: None,
        }
    }

    pub fn list(&self) -> &RecordList {
        &self.list
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_criteria<S: RecordQuery>(
        &mut self,
        store: &S,
        criteria: FilterCriteria,
    ) -> Result<(), QueryError> {
        self.criteria = criteria;
        self.refresh(store)
    }

    /// Toggling the sort direction always forces a reload; the append
    /// heuristic is only valid under ascending creation order.
    pub fn set_sort<S: RecordQuery>(
        &mut self,
        store: &S,
        sort: SortOrder,
    ) -> Result<(), QueryError> {
        self.sort = sort;
        self.refresh(store)
    }

    /// Re-run the compiled criteria against the store and replace the list.
    /// On failure the list degrades to empty and the error is surfaced; no
    /// automatic retry happens until the next change notification.
    pub fn refresh<S: RecordQuery>(&mut self, store: &S) -> Result<(), QueryError> {
        self.state = RefreshState::Refreshing;
        let outcome = self.run_query(store);
        self.state = RefreshState::Idle;
        self.store_count = store.count();

        match outcome {
            Ok(records) => {
                self.last_error = None;
                self.list.reload(records);
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "query refresh failed, degrading to empty result set");
                self.last_error = Some(error.to_string());
                self.compiled = None;
                self.list.reload(Vec::new());
                Err(error)
            }
        }
    }

    /// Classify one store change batch.
    ///
    /// Pure tail insertions (every inserted index at or beyond the
    /// pre-change store count, ascending sort, no update/delete in the
    /// batch) take the append path: only the inserted slice is re-evaluated
    /// against the full criteria. Everything else falls back to a reload,
    /// which is always safe.
    pub fn handle_change<S: RecordQuery>(
        &mut self,
        store: &S,
        batch: &ChangeBatch,
    ) -> Result<Option<ListUpdate>, QueryError> {
        if batch.insertions.is_empty() && batch.updates.is_empty() && batch.deletions.is_empty() {
            return Ok(None);
        }

        if !batch.is_pure_insert() || self.sort == SortOrder::CreatedDescending {
            self.refresh(store)?;
            return Ok(Some(ListUpdate::Reload));
        }

        let pre_count = self.store_count;
        if batch.insertions.iter().any(|&index| index < pre_count) {
            self.refresh(store)?;
            return Ok(Some(ListUpdate::Reload));
        }

        let Some(compiled) = self.compiled.clone() else {
            // No compiled criteria yet (first change, or after a failed
            // compile): a full refresh establishes the baseline.
            self.refresh(store)?;
            return Ok(Some(ListUpdate::Reload));
        };

        let mut indices = batch.insertions.clone();
        indices.sort_unstable();
        let mut inserted = Vec::with_capacity(indices.len());
        for index in indices {
            match store.record_at(index) {
                Some(record) => inserted.push(record),
                None => {
                    // Stale notification; resynchronize from scratch.
                    self.refresh(store)?;
                    return Ok(Some(ListUpdate::Reload));
                }
            }
        }
        self.store_count = store.count();

        let visible: Vec<Record> =
            inserted.into_iter().filter(|record| compiled.matches(record)).collect();
        if visible.is_empty() {
            debug!("append batch fully filtered, list unchanged");
            return Ok(None);
        }

        let range = self.list.append(visible);
        Ok(Some(ListUpdate::Append { range }))
    }

    fn run_query<S: RecordQuery>(&mut self, store: &S) -> Result<Vec<Record>, QueryError> {
        let compiled = compile(&self.criteria)?;
        let records = store
            .fetch(&compiled.native, self.sort)
            .map_err(|error| QueryError::Store(error.to_string()))?;
        let records = if compiled.has_programmatic() {
            records
                .into_iter()
                .filter(|record| compiled.programmatic.iter().all(|f| f.matches(record)))
                .collect()
        } else {
            records
        };
        self.compiled = Some(compiled);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{FieldFilter, Relation, SearchField};
    use crate::store::{LogLevel, RecordDraft, RecordId, RecordStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn pump(
        controller: &mut QueryController,
        store: &RecordStore,
        changes: &mut tokio::sync::broadcast::Receiver<ChangeBatch>,
    ) -> Vec<ListUpdate> {
        let mut updates = Vec::new();
        while let Ok(batch) = changes.try_recv() {
            if let Some(update) = controller.handle_change(store, &batch).expect("handle change") {
                updates.push(update);
            }
        }
        updates
    }

    #[test]
    fn tail_insert_emits_append_with_exact_range() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "one"));
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "two"));

        let mut controller = QueryController::new();
        controller.refresh(&store).expect("refresh");
        assert_eq!(controller.list().len(), 2);

        let mut changes = store.subscribe();
        store.insert(RecordDraft::message(at(30), LogLevel::Info, "app", "three"));
        let updates = pump(&mut controller, &store, &mut changes);
        assert_eq!(updates, vec![ListUpdate::Append { range: 2..3 }]);
        assert_eq!(controller.list().len(), 3);
    }

    #[test]
    fn backdated_insert_forces_reload() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "one"));
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "two"));

        let mut controller = QueryController::new();
        controller.refresh(&store).expect("refresh");

        let mut changes = store.subscribe();
        store.insert(RecordDraft::message(at(5), LogLevel::Info, "app", "early"));
        let updates = pump(&mut controller, &store, &mut changes);
        assert_eq!(updates, vec![ListUpdate::Reload]);
        assert_eq!(controller.list().len(), 3);
        assert_eq!(controller.list().get(0).map(|r| r.id), Some(RecordId(3)));
    }

    #[test]
    fn update_and_delete_batches_force_reload() {
        let mut store = RecordStore::new();
        let id = store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "one"));

        let mut controller = QueryController::new();
        controller.refresh(&store).expect("refresh");

        let mut changes = store.subscribe();
        store.set_pinned(id, true);
        assert_eq!(pump(&mut controller, &store, &mut changes), vec![ListUpdate::Reload]);

        store.remove_all();
        assert_eq!(pump(&mut controller, &store, &mut changes), vec![ListUpdate::Reload]);
        assert!(controller.list().is_empty());
    }

    #[test]
    fn descending_sort_disables_the_append_path() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "one"));

        let mut controller = QueryController::new();
        controller.set_sort(&store, SortOrder::CreatedDescending).expect("set sort");

        let mut changes = store.subscribe();
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "two"));
        assert_eq!(pump(&mut controller, &store, &mut changes), vec![ListUpdate::Reload]);
        assert_eq!(controller.list().get(0).map(|r| r.id), Some(RecordId(2)));
    }

    #[test]
    fn append_reevaluates_programmatic_filters_on_the_new_slice_only() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "keep this"));

        let mut controller = QueryController::new();
        let criteria = FilterCriteria {
            field_filters: vec![FieldFilter {
                field: SearchField::Message,
                relation: Relation::Contains,
                value: "keep".to_string(),
            }],
            ..FilterCriteria::default()
        };
        controller.set_criteria(&store, criteria).expect("set criteria");
        assert_eq!(controller.list().len(), 1);

        let mut changes = store.subscribe();
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "drop that"));
        // The appended record fails the programmatic filter: no update at all.
        assert!(pump(&mut controller, &store, &mut changes).is_empty());
        assert_eq!(controller.list().len(), 1);

        store.insert(RecordDraft::message(at(30), LogLevel::Info, "app", "keep too"));
        let updates = pump(&mut controller, &store, &mut changes);
        assert_eq!(updates, vec![ListUpdate::Append { range: 1..2 }]);
    }

    #[test]
    fn filtered_append_keeps_toggles_on_the_append_path() {
        let mut store = RecordStore::new();
        let pinned = store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "pinned"));
        store.set_pinned(pinned, true);

        let mut controller = QueryController::new();
        let criteria = FilterCriteria { only_pinned: true, ..FilterCriteria::default() };
        controller.set_criteria(&store, criteria).expect("set criteria");
        assert_eq!(controller.list().len(), 1);

        let mut changes = store.subscribe();
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "unpinned"));
        assert!(pump(&mut controller, &store, &mut changes).is_empty());
        assert_eq!(controller.list().len(), 1);
    }

    #[test]
    fn compile_failure_degrades_to_empty_and_surfaces_error() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::message(at(10), LogLevel::Info, "app", "one"));

        let mut controller = QueryController::new();
        let criteria = FilterCriteria {
            field_filters: vec![FieldFilter {
                field: SearchField::Message,
                relation: Relation::Regex,
                value: "[unclosed".to_string(),
            }],
            ..FilterCriteria::default()
        };
        let result = controller.set_criteria(&store, criteria);
        assert!(matches!(result, Err(QueryError::Criteria(_))));
        assert!(controller.list().is_empty());
        assert!(controller.last_error().is_some());
        assert_eq!(controller.state(), RefreshState::Idle);

        // The next change notification retries and recovers.
        let mut changes = store.subscribe();
        controller.set_criteria(&store, FilterCriteria::default()).expect("reset criteria");
        store.insert(RecordDraft::message(at(20), LogLevel::Info, "app", "two"));
        let updates = pump(&mut controller, &store, &mut changes);
        assert_eq!(updates, vec![ListUpdate::Append { range: 1..2 }]);
    }
}
