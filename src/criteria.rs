//! Filter criteria and their compilation into a native predicate plus
//! programmatic post-filters.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{LogLevel, Record, RecordBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Message,
    Label,
    Method,
    Host,
    Url,
    RequestHeaders,
    ResponseHeaders,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relation {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    BeginsWith,
    Regex,
}

/// Free-form `{field, relation, value}` sub-filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: SearchField,
    pub relation: Relation,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// One immutable-per-evaluation snapshot of the user's filter state.
/// Absent sub-filters impose no constraint; the default value matches every
/// record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<BTreeSet<LogLevel>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels_allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels_denied: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_range: Option<RangeInclusive<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<TimePeriod>,
    #[serde(default)]
    pub only_errors: bool,
    #[serde(default)]
    pub only_pinned: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_filters: Vec<FieldFilter>,
}

impl FilterCriteria {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Error)]
pub enum CriteriaError {
    #[error("invalid regex pattern `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// The part of the criteria the store's query layer evaluates natively:
/// level/label/host allow-sets, status/duration/date ranges, toggles, and
/// scalar field comparisons.
#[derive(Debug, Clone)]
pub struct NativePredicate {
    levels: Option<BTreeSet<LogLevel>>,
    labels_allowed: Vec<String>,
    labels_denied: Vec<String>,
    hosts: Vec<String>,
    status_range: Option<RangeInclusive<u16>>,
    duration: Option<DurationRange>,
    content_type: Option<String>,
    period: Option<TimePeriod>,
    only_errors: bool,
    only_pinned: bool,
    fields: Vec<FieldFilter>,
}

impl NativePredicate {
    pub fn matches(&self, record: &Record) -> bool {
        if self.only_pinned && !record.pinned {
            return false;
        }
        if self.only_errors && !record.is_error() {
            return false;
        }
        if let Some(period) = &self.period {
            if period.start.is_some_and(|start| record.created_at < start) {
                return false;
            }
            if period.end.is_some_and(|end| record.created_at > end) {
                return false;
            }
        }

        match &record.body {
            RecordBody::Message { level, label, .. } => {
                if let Some(levels) = &self.levels {
                    if !levels.contains(level) {
                        return false;
                    }
                }
                if !self.labels_allowed.is_empty()
                    && !self.labels_allowed.iter().any(|allowed| allowed == label)
                {
                    return false;
                }
                if self.labels_denied.iter().any(|denied| denied == label) {
                    return false;
                }
            }
            RecordBody::Network {
                host, status, duration_ms, content_type, ..
            } => {
                if !self.hosts.is_empty() {
                    match host {
                        Some(host) => {
                            if !self.hosts.iter().any(|allowed| allowed == host) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                if let Some(range) = &self.status_range {
                    match status {
                        Some(code) => {
                            if !range.contains(code) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                if let Some(bounds) = &self.duration {
                    match duration_ms {
                        Some(elapsed) => {
                            if bounds.min_ms.is_some_and(|min| *elapsed < min) {
                                return false;
                            }
                            if bounds.max_ms.is_some_and(|max| *elapsed > max) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                if let Some(wanted) = &self.content_type {
                    match content_type {
                        Some(actual) => {
                            if !actual.starts_with(wanted.as_str()) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
            }
        }

        self.fields.iter().all(|filter| scalar_filter_matches(filter, record))
    }
}

/// A sub-filter the native layer cannot express; applied in application
/// code over the native result set.
#[derive(Debug, Clone)]
pub struct ProgrammaticFilter {
    field: SearchField,
    matcher: FieldMatcher,
    negate: bool,
}

#[derive(Debug, Clone)]
enum FieldMatcher {
    Substring(String),
    Exact(String),
    Prefix(String),
    Pattern(Regex),
}

impl ProgrammaticFilter {
    fn compile(filter: &FieldFilter) -> Result<Self, CriteriaError> {
        let (matcher, negate) = match filter.relation {
            Relation::Contains => (FieldMatcher::Substring(filter.value.to_lowercase()), false),
            Relation::NotContains => (FieldMatcher::Substring(filter.value.to_lowercase()), true),
            Relation::Equals => (FieldMatcher::Exact(filter.value.to_lowercase()), false),
            Relation::NotEquals => (FieldMatcher::Exact(filter.value.to_lowercase()), true),
            Relation::BeginsWith => (FieldMatcher::Prefix(filter.value.to_lowercase()), false),
            Relation::Regex => (FieldMatcher::Pattern(compile_regex(&filter.value)?), false),
        };
        Ok(Self { field: filter.field, matcher, negate })
    }

    pub fn matches(&self, record: &Record) -> bool {
        // A record without the target field carries empty text, so
        // `contains`/`equals` fail and their negations pass.
        let text = field_text(record, self.field).unwrap_or("");
        let hit = match &self.matcher {
            FieldMatcher::Substring(needle) => text.to_lowercase().contains(needle),
            FieldMatcher::Exact(wanted) => text.to_lowercase() == *wanted,
            FieldMatcher::Prefix(prefix) => text.to_lowercase().starts_with(prefix),
            FieldMatcher::Pattern(regex) => regex.is_match(text),
        };
        hit != self.negate
    }
}

/// Compilation output: everything native, plus the post-filters the caller
/// must run itself.
#[derive(Debug, Clone)]
pub struct CompiledCriteria {
    pub native: NativePredicate,
    pub programmatic: Vec<ProgrammaticFilter>,
}

impl CompiledCriteria {
    /// Full criteria check: native predicate and every programmatic filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.native.matches(record) && self.programmatic.iter().all(|filter| filter.matches(record))
    }

    pub fn has_programmatic(&self) -> bool {
        !self.programmatic.is_empty()
    }
}

/// Split the criteria into a native predicate and programmatic post-filters.
///
/// A field filter stays native only when it is a scalar comparison the
/// store's query layer can evaluate cheaply: `equals`/`not-equals`/
/// `begins-with` over label, method, host or URL. Substring and regex
/// relations, and any relation over message text, headers or bodies, are
/// compiled into programmatic filters.
pub fn compile(criteria: &FilterCriteria) -> Result<CompiledCriteria, CriteriaError> {
    let mut native_fields = Vec::new();
    let mut programmatic = Vec::new();

    for filter in &criteria.field_filters {
        if is_programmatic(filter) {
            programmatic.push(ProgrammaticFilter::compile(filter)?);
        } else {
            native_fields.push(filter.clone());
        }
    }

    Ok(CompiledCriteria {
        native: NativePredicate {
            levels: criteria.levels.clone(),
            labels_allowed: criteria.labels_allowed.clone(),
            labels_denied: criteria.labels_denied.clone(),
            hosts: criteria.hosts.clone(),
            status_range: criteria.status_range.clone(),
            duration: criteria.duration,
            content_type: criteria.content_type.clone(),
            period: criteria.period,
            only_errors: criteria.only_errors,
            only_pinned: criteria.only_pinned,
            fields: native_fields,
        },
        programmatic,
    })
}

fn is_programmatic(filter: &FieldFilter) -> bool {
    matches!(filter.relation, Relation::Contains | Relation::NotContains | Relation::Regex)
        || matches!(
            filter.field,
            SearchField::Message
                | SearchField::RequestHeaders
                | SearchField::ResponseHeaders
                | SearchField::Body
        )
}

fn scalar_filter_matches(filter: &FieldFilter, record: &Record) -> bool {
    let Some(text) = field_text(record, filter.field) else {
        return false;
    };
    let text = text.to_lowercase();
    let value = filter.value.to_lowercase();
    match filter.relation {
        Relation::Equals => text == value,
        Relation::NotEquals => text != value,
        Relation::BeginsWith => text.starts_with(&value),
        // Compilation routes the remaining relations to programmatic filters.
        Relation::Contains | Relation::NotContains | Relation::Regex => true,
    }
}

fn field_text(record: &Record, field: SearchField) -> Option<&str> {
    match (&record.body, field) {
        (RecordBody::Message { text, .. }, SearchField::Message) => Some(text),
        (RecordBody::Message { label, .. }, SearchField::Label) => Some(label),
        (RecordBody::Network { method, .. }, SearchField::Method) => Some(method),
        (RecordBody::Network { url, .. }, SearchField::Url) => Some(url),
        (RecordBody::Network { host, .. }, SearchField::Host) => host.as_deref(),
        (RecordBody::Network { request_headers, .. }, SearchField::RequestHeaders) => {
            Some(request_headers)
        }
        (RecordBody::Network { response_headers, .. }, SearchField::ResponseHeaders) => {
            Some(response_headers)
        }
        (RecordBody::Network { body, .. }, SearchField::Body) => body.as_deref(),
        _ => None,
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, CriteriaError> {
    RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|error| {
        CriteriaError::InvalidRegex { pattern: pattern.to_string(), message: error.to_string() }
    })
}
