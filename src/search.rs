//! Text search over a lock-free snapshot of the record list, partitioned
//! into contiguous chunks searched concurrently.

use memchr::memmem;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use smol_str::SmolStr;
use thiserror::Error;
use tracing::debug;

use crate::list::RecordList;
use crate::store::RecordId;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Upper bound on concurrent chunks.
    pub max_partitions: usize,
    /// Records per chunk below which no extra partition is opened.
    pub min_docs_per_partition: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_partitions: 8, min_docs_per_partition: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Literal,
    WholeWord,
    Regex,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub mode: SearchMode,
}

/// One hit. The ordinal is the record's index in the list at search time
/// and is only valid until the next list mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub record_id: RecordId,
    pub ordinal: usize,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid regex pattern `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },
}

#[derive(Debug, Clone)]
struct SearchDoc {
    id: RecordId,
    text: SmolStr,
    text_lower: SmolStr,
}

/// Snapshot-based substring/regex index. The snapshot is invalidated lazily:
/// list mutations only mark it stale, and the next `search` call rebuilds.
#[derive(Debug)]
pub struct SearchIndex {
    config: SearchConfig,
    docs: Vec<SearchDoc>,
    snapshot_revision: Option<u64>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl SearchIndex {
    pub fn new(config: SearchConfig) -> Self {
        Self { config, docs: Vec::new(), snapshot_revision: None }
    }

    /// Drop the snapshot without rebuilding it.
    pub fn invalidate(&mut self) {
        self.snapshot_revision = None;
    }

    pub fn is_stale(&self, list: &RecordList) -> bool {
        self.snapshot_revision != Some(list.revision())
    }

    /// Snapshot `(id, searchable text)` pairs from the list.
    pub fn rebuild(&mut self, list: &RecordList) {
        self.docs = list
            .snapshot()
            .into_iter()
            .map(|(id, text)| {
                let text_lower = SmolStr::from(text.to_lowercase());
                SearchDoc { id, text, text_lower }
            })
            .collect();
        self.snapshot_revision = Some(list.revision());
        debug!(docs = self.docs.len(), "search snapshot rebuilt");
    }

    /// Search the current snapshot, rebuilding it first if the list moved
    /// on. Matches come back in ascending list order.
    pub fn search(
        &mut self,
        list: &RecordList,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        if self.is_stale(list) {
            self.rebuild(list);
        }

        let term = term.trim();
        if term.is_empty() || self.docs.is_empty() {
            return Ok(Vec::new());
        }

        let matcher = TermMatcher::compile(term, options)?;
        Ok(self.run(&matcher))
    }

    fn run(&self, matcher: &TermMatcher) -> Vec<SearchMatch> {
        let partitions = (self.docs.len() / self.config.min_docs_per_partition)
            .clamp(1, self.config.max_partitions.max(1));
        let chunk_size = (self.docs.len() + partitions - 1) / partitions;

        if partitions == 1 {
            return self
                .docs
                .iter()
                .enumerate()
                .filter(|(_, doc)| matcher.matches(doc))
                .map(|(ordinal, doc)| SearchMatch { record_id: doc.id, ordinal })
                .collect();
        }

        // Chunk boundaries never split a record, so concatenating chunk
        // results in chunk order preserves the global ordering.
        self.docs
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let base = chunk_index * chunk_size;
                chunk
                    .iter()
                    .enumerate()
                    .filter(|(_, doc)| matcher.matches(doc))
                    .map(|(offset, doc)| SearchMatch { record_id: doc.id, ordinal: base + offset })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug)]
enum TermMatcher {
    Literal(memmem::Finder<'static>),
    LiteralLower(String),
    Pattern(Regex),
}

impl TermMatcher {
    fn compile(term: &str, options: &SearchOptions) -> Result<Self, SearchError> {
        // `/term/` forces regex interpretation even in literal mode.
        if let Some(pattern) = strip_regex_delimiters(term) {
            return Ok(Self::Pattern(compile_regex(pattern, options.case_sensitive)?));
        }

        match options.mode {
            SearchMode::Regex => Ok(Self::Pattern(compile_regex(term, options.case_sensitive)?)),
            SearchMode::WholeWord => {
                let pattern = format!(r"\b{}\b", regex::escape(term));
                Ok(Self::Pattern(compile_regex(&pattern, options.case_sensitive)?))
            }
            SearchMode::Literal => {
                if options.case_sensitive {
                    Ok(Self::Literal(memmem::Finder::new(term).into_owned()))
                } else {
                    Ok(Self::LiteralLower(term.to_lowercase()))
                }
            }
        }
    }

    fn matches(&self, doc: &SearchDoc) -> bool {
        match self {
            Self::Literal(finder) => finder.find(doc.text.as_bytes()).is_some(),
            Self::LiteralLower(needle) => doc.text_lower.contains(needle.as_str()),
            Self::Pattern(regex) => regex.is_match(&doc.text),
        }
    }
}

fn strip_regex_delimiters(term: &str) -> Option<&str> {
    term.strip_prefix('/').and_then(|t| t.strip_suffix('/')).filter(|t| !t.is_empty())
}

fn compile_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, SearchError> {
    RegexBuilder::new(pattern).case_insensitive(!case_sensitive).build().map_err(|error| {
        SearchError::InvalidRegex { pattern: pattern.to_string(), message: error.to_string() }
    })
}
