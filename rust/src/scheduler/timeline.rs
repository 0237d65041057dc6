//! Occupied time spans for a single resource.

/// Tracks occupied spans using sorted, non-overlapping half-open intervals.
///
/// Invariant: `busy_periods` is sorted by start and no two periods overlap or
/// touch; touching or overlapping spans are merged on insertion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    busy_periods: Vec<(i64, i64)>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted `[start, finish)` spans.
    pub fn busy_periods(&self) -> &[(i64, i64)] {
        &self.busy_periods
    }

    /// Mark `[start, finish)` as occupied, merging with neighbours.
    ///
    /// Empty spans (zero-duration activities) occupy nothing.
    pub fn occupy(&mut self, start: i64, finish: i64) {
        if finish <= start {
            return;
        }

        let idx = self.busy_periods.partition_point(|&(s, _)| s < start);

        let mut new_start = start;
        let mut new_end = finish;
        let mut merge_start = idx;
        let mut merge_end = idx;

        if idx > 0 {
            let (prev_start, prev_end) = self.busy_periods[idx - 1];
            if prev_end >= start {
                new_start = prev_start;
                new_end = new_end.max(prev_end);
                merge_start = idx - 1;
            }
        }

        while merge_end < self.busy_periods.len() {
            let (next_start, next_end) = self.busy_periods[merge_end];
            if next_start <= new_end {
                new_end = new_end.max(next_end);
                merge_end += 1;
            } else {
                break;
            }
        }

        self.busy_periods.drain(merge_start..merge_end);
        self.busy_periods.insert(merge_start, (new_start, new_end));
    }
}
