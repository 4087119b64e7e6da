//! Batch selector
//!
//! Splits the universe into contiguous batches of `batch_size` units
//! (the last one may be short) and decides which batch the next run
//! works on, based on the persisted cursor:
//!
//! - no history                  → batch 0
//! - cursor key not in universe  → batch 0 (degraded, universe changed)
//! - completed batch k           → batch k+1, or batch 0 after the last
//! - interrupted batch k         → batch k again, after the last done unit
//!
//! Selection is pure; the caller logs the reason.

use std::fmt;

use crate::schema::{Cursor, QueryUnit};
use crate::universe::Universe;

/// Why a batch was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectReason {
    /// No cursor yet (first run, or the previous cycle finished)
    NoHistory,
    /// Previous batch completed, moving on
    Advance,
    /// Previous batch was the last one, cycle restarts
    Wraparound,
    /// Previous run of this batch stopped early
    Resume,
    /// Resume anchor no longer starts a batch; the batch is redone
    /// from its first unit
    ResumeRestarted,
    /// Cursor key is not part of the current universe
    KeyNotFound,
}

impl fmt::Display for SelectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SelectReason::NoHistory => "no history, starting at the first batch",
            SelectReason::Advance => "previous batch completed, advancing",
            SelectReason::Wraparound => "cycle completed, wrapping around to the first batch",
            SelectReason::Resume => "previous run did not finish, repeating batch",
            SelectReason::ResumeRestarted => {
                "previous run did not finish and the universe shifted, redoing batch from its start"
            }
            SelectReason::KeyNotFound => {
                "cursor key not found in the current universe, falling back to the first batch"
            }
        };
        f.write_str(text)
    }
}

/// The batch picked for this run.
#[derive(Debug, Clone)]
pub struct Selection<'u> {
    /// Zero-based batch number
    pub number: usize,

    /// Number of batches in the universe
    pub total: usize,

    pub reason: SelectReason,

    units: &'u [QueryUnit],

    /// Offset inside `units` where processing starts
    start: usize,
}

impl<'u> Selection<'u> {
    /// Every unit of the batch.
    pub fn units(&self) -> &'u [QueryUnit] {
        self.units
    }

    /// Units still to be processed in this run.
    pub fn pending(&self) -> &'u [QueryUnit] {
        &self.units[self.start..]
    }

    pub fn is_last(&self) -> bool {
        self.number + 1 == self.total
    }

    /// Sequence index of the last unit already handled by an
    /// earlier, interrupted run of this batch.
    pub fn resumed_after(&self) -> Option<usize> {
        (self.start > 0).then(|| self.units[self.start - 1].sequence_index)
    }

    /// Cursor to persist once the results of this run are committed.
    ///
    /// - completed last batch → `Start` (full cycle done, cursor cleared)
    /// - completed batch      → `Completed` with the batch's final unit
    /// - stopped early        → `Interrupted` anchored on the batch's
    ///   first unit; `last_advanced` falls back to the previous resume
    ///   point so a run without progress never moves the cursor back
    pub fn cursor_after(&self, completed: bool, last_advanced: Option<usize>) -> Cursor {
        if completed {
            if self.is_last() {
                return Cursor::Start;
            }
            // A batch is never empty: `select_next_batch` only builds
            // selections from non-empty chunks.
            let last = &self.units[self.units.len() - 1];
            return Cursor::Completed { last: last.key() };
        }

        Cursor::Interrupted {
            anchor: self.units[0].key(),
            last_done: last_advanced.or_else(|| self.resumed_after()),
        }
    }
}

/// Picks the next batch for `cursor`.
///
/// `batch_size` of zero is treated as one.
pub fn select_next_batch<'u>(
    universe: &'u Universe,
    cursor: &Cursor,
    batch_size: usize,
) -> Selection<'u> {
    let size = batch_size.max(1);
    let units = universe.units();
    let total = units.len().div_ceil(size);

    let batch = move |number: usize, start: usize, reason: SelectReason| {
        let begin = number * size;
        let end = (begin + size).min(units.len());
        Selection {
            number,
            total,
            reason,
            units: &units[begin..end],
            start,
        }
    };

    match cursor {
        Cursor::Start => batch(0, 0, SelectReason::NoHistory),

        Cursor::Completed { last } => match universe.position(last) {
            None => batch(0, 0, SelectReason::KeyNotFound),
            Some(pos) => {
                let k = pos / size;
                if k + 1 < total {
                    batch(k + 1, 0, SelectReason::Advance)
                } else {
                    batch(0, 0, SelectReason::Wraparound)
                }
            }
        },

        Cursor::Interrupted { anchor, last_done } => match universe.position(anchor) {
            None => batch(0, 0, SelectReason::KeyNotFound),
            Some(pos) if pos % size != 0 => batch(pos / size, 0, SelectReason::ResumeRestarted),
            Some(pos) => {
                let begin = pos;
                let end = (begin + size).min(units.len());
                let start = match last_done {
                    Some(done) if (begin..end).contains(done) => done + 1 - begin,
                    _ => 0,
                };
                batch(pos / size, start, SelectReason::Resume)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn universe(products: usize, locations: usize) -> Universe {
        let p: Vec<String> = (0..products).map(|i| format!("p{i}")).collect();
        let l: Vec<String> = (0..locations).map(|i| format!("l{i}")).collect();
        Universe::build(&p, &l).unwrap()
    }

    fn indices(units: &[QueryUnit]) -> Vec<usize> {
        units.iter().map(|u| u.sequence_index).collect()
    }

    #[test]
    fn no_history_starts_at_first_batch() {
        let u = universe(5, 5);
        let s = select_next_batch(&u, &Cursor::Start, 10);
        assert_eq!(s.number, 0);
        assert_eq!(s.total, 3);
        assert_eq!(indices(s.pending()), (0..10).collect::<Vec<_>>());
        assert_eq!(s.reason, SelectReason::NoHistory);
    }

    #[test]
    fn completed_batch_advances() {
        let u = universe(5, 5);
        let first = select_next_batch(&u, &Cursor::Start, 10);
        let cursor = first.cursor_after(true, Some(9));

        let next = select_next_batch(&u, &cursor, 10);
        assert_eq!(next.number, 1);
        assert_eq!(next.reason, SelectReason::Advance);
        assert_eq!(indices(next.pending()), (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn last_batch_is_short_and_completing_it_clears_the_cursor() {
        let u = universe(5, 5);
        let cursor = Cursor::Completed {
            last: u.units()[19].key(),
        };
        let last = select_next_batch(&u, &cursor, 10);
        assert_eq!(last.number, 2);
        assert!(last.is_last());
        assert_eq!(indices(last.pending()), (20..25).collect::<Vec<_>>());

        assert_eq!(last.cursor_after(true, Some(24)), Cursor::Start);
    }

    #[test]
    fn key_in_last_batch_wraps_around() {
        let u = universe(5, 5);
        let cursor = Cursor::Completed {
            last: u.units()[22].key(),
        };
        let s = select_next_batch(&u, &cursor, 10);
        assert_eq!(s.number, 0);
        assert_eq!(s.reason, SelectReason::Wraparound);
    }

    #[test]
    fn unknown_key_falls_back_to_first_batch() {
        let u = universe(3, 3);
        let cursor = Cursor::Completed {
            last: crate::schema::UnitKey {
                product_key: "gone".into(),
                location_key: "l0".into(),
            },
        };
        let s = select_next_batch(&u, &cursor, 4);
        assert_eq!(s.number, 0);
        assert_eq!(s.reason, SelectReason::KeyNotFound);
    }

    #[test]
    fn interrupted_batch_is_repeated_from_the_resume_point() {
        let u = universe(5, 5);
        let cursor = Cursor::Interrupted {
            anchor: u.units()[10].key(),
            last_done: Some(15),
        };
        let s = select_next_batch(&u, &cursor, 10);
        assert_eq!(s.number, 1);
        assert_eq!(s.reason, SelectReason::Resume);
        assert_eq!(indices(s.units()), (10..20).collect::<Vec<_>>());
        assert_eq!(indices(s.pending()), (16..20).collect::<Vec<_>>());
        assert_eq!(s.resumed_after(), Some(15));
    }

    #[test]
    fn interrupted_batch_without_progress_restarts_the_batch() {
        let u = universe(5, 5);
        let cursor = Cursor::Interrupted {
            anchor: u.units()[10].key(),
            last_done: None,
        };
        let s = select_next_batch(&u, &cursor, 10);
        assert_eq!(indices(s.pending()), (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn resume_point_is_kept_when_a_resumed_run_makes_no_progress() {
        let u = universe(5, 5);
        let cursor = Cursor::Interrupted {
            anchor: u.units()[10].key(),
            last_done: Some(15),
        };
        let s = select_next_batch(&u, &cursor, 10);
        assert_eq!(s.cursor_after(false, None), cursor);
    }

    #[test]
    fn shifted_anchor_redoes_the_containing_batch() {
        let u = universe(5, 5);
        let cursor = Cursor::Interrupted {
            anchor: u.units()[13].key(),
            last_done: Some(15),
        };
        let s = select_next_batch(&u, &cursor, 10);
        assert_eq!(s.number, 1);
        assert_eq!(s.reason, SelectReason::ResumeRestarted);
        assert_eq!(indices(s.pending()), (10..20).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn one_cycle_covers_every_unit_exactly_once(
            products in 1usize..12,
            locations in 1usize..9,
            batch_size in 1usize..20,
        ) {
            let u = universe(products, locations);
            let mut cursor = Cursor::Start;
            let mut seen = Vec::new();

            loop {
                let s = select_next_batch(&u, &cursor, batch_size);
                let last = s.pending().last().map(|q| q.sequence_index);
                seen.extend(indices(s.pending()));
                cursor = s.cursor_after(true, last);
                if cursor == Cursor::Start {
                    break;
                }
                prop_assert!(seen.len() <= u.len());
            }

            prop_assert_eq!(seen, (0..u.len()).collect::<Vec<_>>());
        }
    }
}
