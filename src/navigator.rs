//! Cursor over an ordered match list, with wrap-around navigation and
//! closest-surviving-match reselection across corpus changes.

use crate::search::SearchMatch;

#[derive(Debug, Clone, Default)]
pub struct MatchNavigator {
    matches: Vec<SearchMatch>,
    selected: usize,
}

impl MatchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn current(&self) -> Option<&SearchMatch> {
        self.matches.get(self.selected)
    }

    /// Replace the match list, resetting the cursor to the first match.
    pub fn set_matches(&mut self, matches: Vec<SearchMatch>) {
        self.matches = matches;
        self.selected = 0;
    }

    /// Replace the match list while trying to keep the same logical record
    /// selected. Falls back to the first match when the previous selection
    /// did not survive.
    pub fn refresh(&mut self, matches: Vec<SearchMatch>) {
        let previous = self.current().map(|m| m.record_id);
        self.matches = matches;
        self.selected = previous
            .and_then(|id| self.matches.iter().position(|m| m.record_id == id))
            .unwrap_or(0);
    }

    pub fn clear(&mut self) {
        self.matches.clear();
        self.selected = 0;
    }

    /// Advance with wrap-around. No-op on an empty match list.
    pub fn next(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.selected = (self.selected + 1) % self.matches.len();
        self.current()
    }

    /// Step back with wrap-around. No-op on an empty match list.
    pub fn previous(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.selected = (self.selected + self.matches.len() - 1) % self.matches.len();
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordId;
    use rstest::rstest;

    fn matches_for(ids: &[u64]) -> Vec<SearchMatch> {
        ids.iter()
            .enumerate()
            .map(|(ordinal, &id)| SearchMatch { record_id: RecordId(id), ordinal })
            .collect()
    }

    #[rstest]
    #[case(3)]
    #[case(1)]
    #[case(7)]
    fn next_called_count_times_returns_to_start(#[case] count: u64) {
        let ids: Vec<u64> = (1..=count).collect();
        let mut navigator = MatchNavigator::new();
        navigator.set_matches(matches_for(&ids));
        navigator.next();
        let origin = navigator.selected_index();

        for _ in 0..count {
            navigator.next();
        }
        assert_eq!(navigator.selected_index(), origin);

        for _ in 0..count {
            navigator.previous();
        }
        assert_eq!(navigator.selected_index(), origin);
    }

    #[test]
    fn navigation_on_empty_matches_is_a_no_op() {
        let mut navigator = MatchNavigator::new();
        assert!(navigator.next().is_none());
        assert!(navigator.previous().is_none());
        assert_eq!(navigator.selected_index(), 0);
    }

    #[test]
    fn refresh_keeps_the_surviving_selection() {
        let mut navigator = MatchNavigator::new();
        navigator.set_matches(matches_for(&[10, 20, 30]));
        navigator.next(); // record 20

        // Record 20 moved to a different position.
        navigator.refresh(matches_for(&[5, 10, 20, 30]));
        assert_eq!(navigator.selected_index(), 2);
        assert_eq!(navigator.current().map(|m| m.record_id), Some(RecordId(20)));
    }

    #[test]
    fn refresh_resets_when_the_selection_is_gone() {
        let mut navigator = MatchNavigator::new();
        navigator.set_matches(matches_for(&[10, 20, 30]));
        navigator.next(); // record 20

        navigator.refresh(matches_for(&[10, 30]));
        assert_eq!(navigator.selected_index(), 0);
        assert_eq!(navigator.current().map(|m| m.record_id), Some(RecordId(10)));
    }
}
