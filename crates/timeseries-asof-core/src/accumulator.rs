//! Aggregate state.
//!
//! [`Accumulator`] is mergeable partial state: partitions summarize their
//! own rows, then states are merged in partition order. [`SlidingWindow`]
//! supports removal from the front for time windows by merging, never by
//! subtracting. Nulls are never
//! pushed; empty state finishes to `0` for `Sum`/`Count` and null otherwise.
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field};

use crate::summarize::AggregateKind;

/// Running statistics over a sequence of values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Accumulator {
    count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
    min: Option<f64>,
    max: Option<f64>,
    first: Option<f64>,
    last: Option<f64>,
}

impl Accumulator {
    pub(crate) fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.first.get_or_insert(value);
        self.last = Some(value);
    }

    /// Push a possibly-null value; nulls are ignored.
    #[inline]
    pub(crate) fn push_opt(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.push(value);
        }
    }

    /// Fold in the state of values that come after this state's values.
    pub(crate) fn merge(&mut self, later: &Accumulator) {
        if later.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *later;
            return;
        }
        let (na, nb) = (self.count as f64, later.count as f64);
        let n = na + nb;
        let delta = later.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += later.m2 + delta * delta * na * nb / n;
        self.count += later.count;
        self.sum += later.sum;
        self.min = min_opt(self.min, later.min);
        self.max = max_opt(self.max, later.max);
        self.last = later.last;
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Finished value for a floating-point aggregate.
    pub(crate) fn finish(&self, kind: AggregateKind) -> Option<f64> {
        match kind {
            AggregateKind::Sum => Some(self.sum),
            AggregateKind::Count => Some(self.count as f64),
            AggregateKind::Average => (self.count > 0).then(|| self.sum / self.count as f64),
            AggregateKind::Min => self.min,
            AggregateKind::Max => self.max,
            AggregateKind::Variance => self.variance(),
            AggregateKind::StdDev => self.variance().map(f64::sqrt),
            AggregateKind::First => self.first,
            AggregateKind::Last => self.last,
        }
    }

    fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2.max(0.0) / (self.count - 1) as f64)
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Aggregate state over a window that advances through one group's rows.
///
/// Rows are identified by their position within the group; they must be
/// pushed in order and evicted in the same order.
///
/// Two stacks keep the state without ever subtracting a value: new rows go
/// on `back` (with a running total), evictions pop `front`, whose entries
/// hold the aggregate of themselves and every newer `front` entry. When
/// `front` runs dry it is rebuilt from `back`, so each row is merged a
/// constant number of times.
#[derive(Debug, Default)]
pub(crate) struct SlidingWindow {
    front: Vec<(usize, Accumulator)>,
    back: Vec<(usize, f64)>,
    back_total: Accumulator,
}

impl SlidingWindow {
    pub(crate) fn push(&mut self, pos: usize, value: Option<f64>) {
        let Some(value) = value else {
            return;
        };
        self.back.push((pos, value));
        self.back_total.push(value);
    }

    /// Remove the row at `pos` if it is the oldest value held.
    pub(crate) fn evict(&mut self, pos: usize) {
        if self.front.is_empty() {
            self.refill();
        }
        if self.front.last().is_some_and(|&(p, _)| p == pos) {
            self.front.pop();
        }
    }

    fn refill(&mut self) {
        let mut suffix = Accumulator::default();
        for (pos, value) in self.back.drain(..).rev() {
            let mut state = Accumulator::default();
            state.push(value);
            state.merge(&suffix);
            suffix = state;
            self.front.push((pos, state));
        }
        self.back_total = Accumulator::default();
    }

    /// Current state as an [`Accumulator`].
    pub(crate) fn snapshot(&self) -> Accumulator {
        let mut state = self
            .front
            .last()
            .map(|&(_, state)| state)
            .unwrap_or_default();
        state.merge(&self.back_total);
        state
    }
}

/// Output field of an aggregate column.
pub(crate) fn aggregate_field(kind: AggregateKind, name: &str) -> Field {
    match kind {
        AggregateKind::Count => Field::new(name, DataType::Int64, false),
        AggregateKind::Sum => Field::new(name, DataType::Float64, false),
        _ => Field::new(name, DataType::Float64, true),
    }
}

/// Collects finished aggregate values into an Arrow column.
#[derive(Debug)]
pub(crate) struct AggregateBuilder {
    kind: AggregateKind,
    counts: Vec<i64>,
    values: Vec<Option<f64>>,
}

impl AggregateBuilder {
    pub(crate) fn with_capacity(kind: AggregateKind, capacity: usize) -> Self {
        let (counts, values) = if kind == AggregateKind::Count {
            (Vec::with_capacity(capacity), Vec::new())
        } else {
            (Vec::new(), Vec::with_capacity(capacity))
        };
        AggregateBuilder {
            kind,
            counts,
            values,
        }
    }

    pub(crate) fn append(&mut self, state: &Accumulator) {
        match self.kind {
            AggregateKind::Count => self.counts.push(state.count() as i64),
            kind => self.values.push(state.finish(kind)),
        }
    }

    pub(crate) fn finish(self) -> ArrayRef {
        match self.kind {
            AggregateKind::Count => Arc::new(Int64Array::from(self.counts)),
            AggregateKind::Sum => Arc::new(Float64Array::from(
                self.values
                    .into_iter()
                    .map(|v| v.unwrap_or(0.0))
                    .collect::<Vec<_>>(),
            )),
            _ => Arc::new(Float64Array::from(self.values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int64Type};

    fn acc(values: &[f64]) -> Accumulator {
        let mut acc = Accumulator::default();
        values.iter().for_each(|&v| acc.push(v));
        acc
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn empty_state_finishes_to_zero_or_null() {
        let empty = Accumulator::default();
        assert_eq!(empty.finish(AggregateKind::Sum), Some(0.0));
        assert_eq!(empty.finish(AggregateKind::Count), Some(0.0));
        assert_eq!(empty.finish(AggregateKind::Average), None);
        assert_eq!(empty.finish(AggregateKind::Min), None);
        assert_eq!(empty.finish(AggregateKind::First), None);
        assert_eq!(acc(&[3.0]).finish(AggregateKind::Variance), None);
    }

    #[test]
    fn sample_variance_and_stddev() {
        let a = acc(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!(close(a.finish(AggregateKind::Average), 5.0));
        assert!(close(a.finish(AggregateKind::Variance), 32.0 / 7.0));
        assert!(close(a.finish(AggregateKind::StdDev), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn merge_matches_sequential_pushes() {
        let values = [1.0, -3.5, 8.0, 2.0, 2.0, 11.0, 0.5];
        let whole = acc(&values);
        for split in 0..=values.len() {
            let mut left = acc(&values[..split]);
            left.merge(&acc(&values[split..]));
            assert_eq!(left.count(), whole.count());
            for kind in AggregateKind::ALL {
                let (a, b) = (left.finish(kind), whole.finish(kind));
                match b {
                    Some(b) => assert!(close(a, b), "{kind:?} split {split}: {a:?} vs {b}"),
                    None => assert_eq!(a, None),
                }
            }
        }
    }

    #[test]
    fn sliding_window_tracks_extremes_and_resets() {
        let mut w = SlidingWindow::default();
        w.push(0, Some(5.0));
        w.push(1, None);
        w.push(2, Some(1.0));
        w.push(3, Some(3.0));
        let s = w.snapshot();
        assert_eq!(s.count(), 3);
        assert_eq!(s.finish(AggregateKind::Min), Some(1.0));
        assert_eq!(s.finish(AggregateKind::Max), Some(5.0));
        assert_eq!(s.finish(AggregateKind::First), Some(5.0));

        w.evict(0);
        w.evict(1);
        let s = w.snapshot();
        assert_eq!(s.finish(AggregateKind::Max), Some(3.0));
        assert!(close(s.finish(AggregateKind::Sum), 4.0));
        assert!(close(s.finish(AggregateKind::Variance), 2.0));

        w.evict(2);
        w.evict(3);
        let s = w.snapshot();
        assert_eq!(s.finish(AggregateKind::Sum), Some(0.0));
        assert_eq!(s.finish(AggregateKind::Average), None);
    }

    #[test]
    fn evicting_a_huge_value_leaves_the_rest_exact() {
        let mut w = SlidingWindow::default();
        w.push(0, Some(1e20));
        w.push(1, Some(1.0));
        w.push(2, Some(0.0));
        w.evict(0);
        let s = w.snapshot();
        assert_eq!(s.finish(AggregateKind::Sum), Some(1.0));
        assert_eq!(s.finish(AggregateKind::Average), Some(0.5));
        assert_eq!(s.finish(AggregateKind::Variance), Some(0.5));

        // rows pushed after a refill land on the back stack
        w.push(3, Some(2.0));
        w.evict(1);
        let s = w.snapshot();
        assert_eq!(s.finish(AggregateKind::Sum), Some(2.0));
        assert_eq!(s.finish(AggregateKind::First), Some(0.0));
        assert_eq!(s.finish(AggregateKind::Last), Some(2.0));
        assert_eq!(s.finish(AggregateKind::Max), Some(2.0));
    }

    #[test]
    fn builder_types_follow_the_aggregate() {
        let mut count = AggregateBuilder::with_capacity(AggregateKind::Count, 2);
        count.append(&acc(&[1.0, 2.0]));
        count.append(&Accumulator::default());
        let count = count.finish();
        assert_eq!(count.as_primitive::<Int64Type>().values().as_ref(), &[2, 0]);

        let mut mean = AggregateBuilder::with_capacity(AggregateKind::Average, 2);
        mean.append(&acc(&[1.0, 2.0]));
        mean.append(&Accumulator::default());
        let mean = mean.finish();
        let mean = mean.as_primitive::<Float64Type>();
        assert_eq!(mean.value(0), 1.5);
        assert!(mean.is_null(1));

        assert!(!aggregate_field(AggregateKind::Sum, "v_sum").is_nullable());
        assert!(aggregate_field(AggregateKind::Max, "v_max").is_nullable());
    }
}
