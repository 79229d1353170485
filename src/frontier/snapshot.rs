use crate::state::UrlRecord;

/// Point-in-time copy of the frontier, enough to resume a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontierSnapshot {
    /// All records, ordered by discovery sequence
    pub records: Vec<UrlRecord>,

    /// Pending queue, front first
    pub queue: Vec<String>,
}

impl FrontierSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records that still need work after a restore
    pub fn unfinished(&self) -> usize {
        self.records.iter().filter(|r| !r.is_terminal()).count()
    }
}
