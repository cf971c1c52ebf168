use crate::id::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifiers found on the listing page, accumulated across scroll passes.
///
/// Membership only ever grows: a virtualized list that stops rendering an
/// earlier row does not remove it from the set. First-seen order is kept so
/// runs over the same listing visit tasks in a reproducible order.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySet {
    order: Vec<Identifier>,
    seen: HashSet<Identifier>,
    passes: u32,
    stable_passes: u32,
}

impl DiscoverySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one pass worth of identifiers. Returns how many were new.
    ///
    /// Counts the pass and updates the stability counter: a pass that adds
    /// nothing increments it, any new member resets it.
    pub fn merge_pass<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = Identifier>,
    {
        let added = self.extend(ids);
        self.passes += 1;
        if added == 0 {
            self.stable_passes += 1;
        } else {
            self.stable_passes = 0;
        }
        added
    }

    /// Add identifiers without counting a scroll pass.
    pub fn extend<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = Identifier>,
    {
        let mut added = 0;
        for id in ids {
            if self.seen.insert(id.clone()) {
                self.order.push(id);
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Consecutive passes that found nothing new.
    pub fn stable_passes(&self) -> u32 {
        self.stable_passes
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.order
    }

    pub fn into_ordered(self) -> Vec<Identifier> {
        self.order
    }
}

/// Why scroll discovery stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured number of consecutive passes added nothing.
    Settled,
    /// The pass limit was reached while identifiers were still appearing.
    PassLimit,
    /// The operator interrupted discovery.
    Cancelled,
}

/// Result of one discovery run, handed read-only to the collection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub listing_url: String,
    pub extracted_at: String,
    pub passes: u32,
    pub stop_reason: StopReason,
    pub ids: Vec<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<Identifier> {
        raw.iter().map(|s| Identifier::parse(s).unwrap()).collect()
    }

    #[test]
    fn merge_preserves_first_seen_order() {
        let mut set = DiscoverySet::new();
        set.merge_pass(ids(&["task_e_b", "task_e_a"]));
        set.merge_pass(ids(&["task_e_c", "task_e_a", "task_e_b"]));
        assert_eq!(set.as_slice(), ids(&["task_e_b", "task_e_a", "task_e_c"]).as_slice());
    }

    #[test]
    fn set_is_monotonic_when_rows_unrender() {
        let mut set = DiscoverySet::new();
        let frames = [
            ids(&["task_e_1", "task_e_2", "task_e_3"]),
            ids(&["task_e_3", "task_e_4"]),
            ids(&["task_e_5"]),
            ids(&[]),
        ];
        let mut previous: Vec<Identifier> = Vec::new();
        for frame in frames {
            set.merge_pass(frame);
            assert!(previous.iter().all(|id| set.contains(id)));
            previous = set.as_slice().to_vec();
        }
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn stability_counter_resets_on_growth() {
        let mut set = DiscoverySet::new();
        assert_eq!(set.merge_pass(ids(&["task_e_a"])), 1);
        assert_eq!(set.merge_pass(ids(&["task_e_a"])), 0);
        assert_eq!(set.merge_pass(ids(&["task_e_a"])), 0);
        assert_eq!(set.stable_passes(), 2);
        assert_eq!(set.merge_pass(ids(&["task_e_b"])), 1);
        assert_eq!(set.stable_passes(), 0);
        assert_eq!(set.passes(), 4);
    }

    #[test]
    fn extend_does_not_count_a_pass() {
        let mut set = DiscoverySet::new();
        set.extend(ids(&["task_e_a", "task_e_a"]));
        assert_eq!(set.len(), 1);
        assert_eq!(set.passes(), 0);
    }
}
