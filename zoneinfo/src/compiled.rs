//! The compiled zone model and its lookups.
//!
//! A [`CompiledZone`] is an ordered, contiguous set of [`ZoneInterval`]s that
//! starts at `BEGINNING_OF_TIME`, optionally followed by a [`TailRule`] that
//! computes the zone's transitions past its last explicit interval.

use alloc::{string::String, vec::Vec};

use crate::{
    rule::{RuleSet, MAX_RECURRENCE_ITERATIONS},
    types::AbbreviationFormat,
    utils::{self, year_for_epoch_seconds, SECONDS_PER_DAY},
    ZoneInfoError, BEGINNING_OF_TIME, END_OF_TIME,
};

/// A span of time with a stable offset and abbreviation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ZoneInterval {
    /// Inclusive start instant
    pub start: i64,
    /// Exclusive end instant, `END_OF_TIME` when open
    pub end: i64,
    pub std_offset: i64,
    pub savings: i64,
    pub name: String,
}

impl ZoneInterval {
    /// The UT offset of the wall clock during this interval.
    pub fn wall_offset(&self) -> i64 {
        self.std_offset + self.savings
    }

    pub fn is_dst(&self) -> bool {
        self.savings != 0
    }

    pub fn contains(&self, instant: i64) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether `local`, the wall clock seconds as if they were UT, falls in this interval.
    pub fn contains_local(&self, local: i64) -> bool {
        let wall = self.wall_offset();
        self.start.saturating_add(wall) <= local && local < self.end.saturating_add(wall)
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == END_OF_TIME
    }
}

/// The open ended rule continuing a zone after its explicit intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TailRule {
    /// The first transition handled by the tail
    pub start: i64,
    pub std_offset: i64,
    pub format: AbbreviationFormat,
    /// The savings in effect from `start`
    pub initial_savings: i64,
    pub initial_letter: Option<String>,
    /// The unbounded recurrences
    pub rules: RuleSet,
}

struct TailState {
    cursor: i64,
    savings: i64,
    name: String,
    /// Whether `cursor` is known to be an interval boundary.
    at_boundary: bool,
}

impl TailRule {
    fn name(&self, savings: i64, letter: Option<&str>) -> Result<String, ZoneInfoError> {
        self.format.format(self.std_offset, savings, letter)
    }

    fn initial_state(&self) -> Result<TailState, ZoneInfoError> {
        Ok(TailState {
            cursor: self.start,
            savings: self.initial_savings,
            name: self.name(self.initial_savings, self.initial_letter.as_deref())?,
            at_boundary: true,
        })
    }

    /// Estimates the state at 1 January of `year` from the latest earlier
    /// recurrence transition.
    fn anchor_state(&self, year: i32) -> Result<TailState, ZoneInfoError> {
        let anchor = utils::epoch_seconds_for_year(year);
        if anchor <= self.start {
            return self.initial_state();
        }
        let mut latest = None;
        for recurrence in self.rules.recurrences() {
            let previous = recurrence.previous_transition(anchor.saturating_add(1), self.std_offset, 0)?;
            if let Some(at) = previous {
                if latest.is_none_or(|(latest_at, _)| at > latest_at) {
                    latest = Some((at, recurrence));
                }
            }
        }
        let Some((_, recurrence)) = latest else {
            return self.initial_state();
        };
        Ok(TailState {
            cursor: anchor,
            savings: recurrence.savings(),
            name: self.name(recurrence.savings(), recurrence.letter.as_deref())?,
            at_boundary: false,
        })
    }

    /// Returns the tail interval containing `instant`, which must not precede
    /// the tail start.
    pub fn interval_at(&self, instant: i64) -> Result<ZoneInterval, ZoneInfoError> {
        let mut anchor_year = year_for_epoch_seconds(instant) - 1;
        for _ in 0..MAX_RECURRENCE_ITERATIONS {
            let state = self.anchor_state(anchor_year)?;
            if let Some(interval) = self.walk_from(state, instant)? {
                return Ok(interval);
            }
            anchor_year -= 1;
        }
        Err(ZoneInfoError::RecurrenceDidNotTerminate {
            rule_set: self.rules.name.clone(),
            year: anchor_year,
        })
    }

    // Streams forward from the state until the interval around `instant` is
    // bounded on both sides. `None` when no boundary precedes `instant`.
    fn walk_from(
        &self,
        state: TailState,
        instant: i64,
    ) -> Result<Option<ZoneInterval>, ZoneInfoError> {
        let TailState {
            cursor,
            mut savings,
            mut name,
            at_boundary,
        } = state;
        let mut interval_start = at_boundary.then_some(cursor);
        let mut transitions = self.rules.transitions(cursor, self.std_offset, savings);
        let end = loop {
            let Some(transition) = transitions.next().transpose()? else {
                break END_OF_TIME;
            };
            let transition_name = transition.name(&self.format, self.std_offset)?;
            let changed = transition.savings != savings || transition_name != name;
            if transition.at > instant && changed {
                break transition.at;
            }
            if transition.at <= instant && changed {
                interval_start = Some(transition.at);
            }
            savings = transition.savings;
            name = transition_name;
        };
        Ok(interval_start.map(|start| ZoneInterval {
            start,
            end,
            std_offset: self.std_offset,
            savings,
            name,
        }))
    }
}

/// The gap a local time fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalGap {
    /// The wall offset before the transition
    pub offset_before: i64,
    /// The wall offset after the transition
    pub offset_after: i64,
    /// The transition instant
    pub transition: i64,
}

/// The intervals a local time resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalIntervals {
    /// The local time was skipped.
    Zero(LocalGap),
    One(ZoneInterval),
    /// The local time is repeated, the earlier interval first.
    Two(ZoneInterval, ZoneInterval),
}

impl LocalIntervals {
    pub fn len(&self) -> usize {
        match self {
            Self::Zero(_) => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Zero(_))
    }
}

/// The compiled data for one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CompiledZone {
    pub intervals: Vec<ZoneInterval>,
    pub tail: Option<TailRule>,
}

impl CompiledZone {
    /// The last instant covered by the zone, exclusive.
    pub fn coverage_end(&self) -> i64 {
        if self.tail.is_some() {
            return END_OF_TIME;
        }
        self.intervals.last().map_or(BEGINNING_OF_TIME, |i| i.end)
    }

    /// Returns the interval containing `instant`, or `None` when the instant is
    /// beyond the zone's coverage.
    pub fn interval_for_instant(
        &self,
        instant: i64,
    ) -> Result<Option<ZoneInterval>, ZoneInfoError> {
        if let Some(tail) = &self.tail {
            if instant >= tail.start {
                return tail.interval_at(instant).map(Some);
            }
        }
        let index = self.intervals.partition_point(|i| i.start <= instant);
        Ok(index
            .checked_sub(1)
            .and_then(|index| self.intervals.get(index))
            .filter(|interval| interval.contains(instant))
            .cloned())
    }

    /// Returns the explicit and tail intervals overlapping `[start, end)`, in order.
    pub fn intervals_in_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<ZoneInterval>, ZoneInfoError> {
        let mut output = self
            .intervals
            .iter()
            .filter(|i| i.start < end && start < i.end)
            .cloned()
            .collect::<Vec<_>>();
        let Some(tail) = &self.tail else {
            return Ok(output);
        };
        let mut cursor = start.max(tail.start);
        while cursor < end {
            let interval = tail.interval_at(cursor)?;
            cursor = interval.end;
            output.push(interval);
        }
        Ok(output)
    }

    /// Resolves a local time, given as wall clock seconds as if they were UT.
    ///
    /// Returns `None` when the local time is beyond the zone's coverage.
    pub fn intervals_for_local(&self, local: i64) -> Result<Option<LocalIntervals>, ZoneInfoError> {
        const WINDOW: i64 = 2 * SECONDS_PER_DAY;
        let candidates =
            self.intervals_in_range(local.saturating_sub(WINDOW), local.saturating_add(WINDOW))?;
        let mut matching = candidates.iter().filter(|i| i.contains_local(local));
        match (matching.next(), matching.next()) {
            (Some(earlier), Some(later)) => {
                return Ok(Some(LocalIntervals::Two(earlier.clone(), later.clone())))
            }
            (Some(only), None) => return Ok(Some(LocalIntervals::One(only.clone()))),
            _ => {}
        }
        let gap = candidates.windows(2).find_map(|pair| {
            let (before, after) = (&pair[0], &pair[1]);
            let skipped = before.end.saturating_add(before.wall_offset()) <= local
                && local < after.start.saturating_add(after.wall_offset());
            skipped.then_some(LocalGap {
                offset_before: before.wall_offset(),
                offset_after: after.wall_offset(),
                transition: after.start,
            })
        });
        Ok(gap.map(LocalIntervals::Zero))
    }

    /// Returns the first transition strictly after `instant`.
    pub fn next_transition(&self, instant: i64) -> Result<Option<i64>, ZoneInfoError> {
        let Some(interval) = self.interval_for_instant(instant)? else {
            return Ok(None);
        };
        Ok((!interval.is_open_ended()).then_some(interval.end))
    }

    /// Returns the last transition strictly before `instant`.
    pub fn previous_transition(&self, instant: i64) -> Result<Option<i64>, ZoneInfoError> {
        let lookup = if instant > self.coverage_end() {
            self.coverage_end().saturating_sub(1)
        } else {
            instant.saturating_sub(1)
        };
        let Some(interval) = self.interval_for_instant(lookup)? else {
            return Ok(None);
        };
        if interval.start == BEGINNING_OF_TIME {
            return Ok(None);
        }
        if instant > self.coverage_end() {
            return Ok(Some(interval.end));
        }
        Ok(Some(interval.start))
    }
}

#[cfg(test)]
mod tests {
    use alloc::{borrow::ToOwned, vec};

    use super::*;
    use crate::{parser::ZoneInfoParser, rule::Recurrence};

    fn fixed(start: i64, end: i64, offset: i64, name: &str) -> ZoneInterval {
        ZoneInterval {
            start,
            end,
            std_offset: offset,
            savings: 0,
            name: name.to_owned(),
        }
    }

    fn us_tail(start: i64) -> TailRule {
        let source = "R US 2007 ma - Mar Su>=8 2 1 D\nR US 2007 ma - N Su>=1 2 0 S\n";
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        let recurrences: Vec<Recurrence> = data.rules["US"].recurrences().to_vec();
        TailRule {
            start,
            std_offset: -18000,
            format: AbbreviationFormat::Letter("E%sT".to_owned()),
            initial_savings: 3600,
            initial_letter: Some("D".to_owned()),
            rules: RuleSet::from_recurrences("US", recurrences),
        }
    }

    // 2008-03-09T07:00Z
    const TAIL_START: i64 = 1_205_046_000;

    fn new_york_like() -> CompiledZone {
        CompiledZone {
            intervals: vec![fixed(BEGINNING_OF_TIME, TAIL_START, -18000, "EST")],
            tail: Some(us_tail(TAIL_START)),
        }
    }

    #[test]
    fn explicit_lookup() {
        let zone = CompiledZone {
            intervals: vec![
                fixed(BEGINNING_OF_TIME, 0, 3600, "A"),
                fixed(0, 100, 7200, "B"),
            ],
            tail: None,
        };
        assert_eq!(zone.interval_for_instant(-1).unwrap().unwrap().name, "A");
        assert_eq!(zone.interval_for_instant(0).unwrap().unwrap().name, "B");
        assert_eq!(zone.interval_for_instant(99).unwrap().unwrap().name, "B");
        assert_eq!(zone.interval_for_instant(100).unwrap(), None);
        assert_eq!(zone.coverage_end(), 100);
        assert_eq!(zone.next_transition(-50).unwrap(), Some(0));
        assert_eq!(zone.previous_transition(50).unwrap(), Some(0));
        assert_eq!(zone.previous_transition(0).unwrap(), None);
        assert_eq!(zone.previous_transition(500).unwrap(), Some(100));
    }

    #[test]
    fn tail_lookup() {
        let zone = new_york_like();
        // 2025-07-01T12:00Z
        let summer = zone.interval_for_instant(1_751_371_200).unwrap().unwrap();
        assert_eq!(summer.name, "EDT");
        assert_eq!(summer.wall_offset(), -14400);
        assert_eq!(summer.start, 1_741_503_600);
        assert_eq!(summer.end, 1_762_063_200);

        let first = zone.interval_for_instant(TAIL_START).unwrap().unwrap();
        assert_eq!(first.start, TAIL_START);
        assert_eq!(first.name, "EDT");

        // 2030-03-10T07:00Z is the spring transition of 2030.
        let spring = zone.interval_for_instant(1_899_356_400).unwrap().unwrap();
        assert_eq!(spring.start, 1_899_356_400);
        assert_eq!(spring.name, "EDT");
        let before = zone.interval_for_instant(1_899_356_399).unwrap().unwrap();
        assert_eq!(before.name, "EST");
        assert_eq!(before.end, 1_899_356_400);
        assert_eq!(zone.next_transition(1_899_356_399).unwrap(), Some(1_899_356_400));
        assert_eq!(zone.previous_transition(1_899_356_401).unwrap(), Some(1_899_356_400));
    }

    #[test]
    fn local_lookup() {
        let zone = new_york_like();
        // 2025-03-09T02:30 does not exist.
        let gap = zone.intervals_for_local(1_741_487_400).unwrap().unwrap();
        assert_eq!(
            gap,
            LocalIntervals::Zero(LocalGap {
                offset_before: -18000,
                offset_after: -14400,
                transition: 1_741_503_600,
            })
        );
        // 2025-11-02T01:30 happens twice.
        let overlap = zone.intervals_for_local(1_762_047_000).unwrap().unwrap();
        let LocalIntervals::Two(earlier, later) = overlap else {
            panic!("expected two intervals");
        };
        assert_eq!(earlier.name, "EDT");
        assert_eq!(later.name, "EST");
        // 2025-07-01T12:00 local
        let one = zone.intervals_for_local(1_751_371_200).unwrap().unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn range_crosses_into_tail() {
        let zone = new_york_like();
        let intervals = zone
            .intervals_in_range(TAIL_START - 10, 1_767_225_600)
            .unwrap();
        // EST, then 2008 through 2025 alternating
        assert_eq!(intervals.len(), 1 + 18 * 2);
        assert!(intervals.windows(2).all(|w| w[0].end == w[1].start));
    }
}
