//! Loupe: the live core of a log viewer. Keeps a growing set of log and
//! network records filtered, sorted and searchable with minimal UI churn,
//! and renders JSON payloads as interactively foldable styled text.

pub mod criteria;
pub mod json;
pub mod list;
pub mod navigator;
pub mod query;
pub mod search;
pub mod store;
pub mod transform;

pub use criteria::{
    compile, CompiledCriteria, CriteriaError, DurationRange, FieldFilter, FilterCriteria,
    NativePredicate, ProgrammaticFilter, Relation, SearchField, TimePeriod,
};
pub use json::{
    matching_bracket, JsonError, JsonRenderer, JsonTree, NodeKind, NodeRef, Primitive,
    RenderConfig, StyleKind, StyleRun, StyledText,
};
pub use list::{ListUpdate, RecordList};
pub use navigator::MatchNavigator;
pub use query::{QueryController, QueryError, RefreshState};
pub use search::{
    SearchConfig, SearchError, SearchIndex, SearchMatch, SearchMode, SearchOptions,
};
pub use store::{
    ChangeBatch, LogLevel, Record, RecordBody, RecordDraft, RecordId, RecordQuery, RecordStore,
    SortOrder, TaskState,
};
pub use transform::{run_transform, TransformConfig, TransformError, TransformTracker};
