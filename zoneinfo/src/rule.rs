//! Rule recurrences and rule sets
//!
//! A [`Recurrence`] is a single `Rule` line: one annual transition over a range
//! of years. A [`RuleSet`] is every recurrence sharing a name, and is able to
//! produce the merged, chronological stream of transitions for a zone line.

use core::str::SplitWhitespace;

use alloc::{borrow::ToOwned, format, string::String, vec, vec::Vec};

use hashbrown::HashMap;

use crate::{
    parser::{expect_end, next_split, ContextParse, LineParseContext, ZoneInfoParseError},
    types::{AbbreviationFormat, DayOfMonth, Month, QualifiedTime, RuleYear, Time},
    utils::{self, epoch_seconds_for_epoch_days, year_for_epoch_seconds},
    ZoneInfoError, BEGINNING_OF_TIME,
};

/// The amount of consecutive years a recurrence is searched before giving up.
pub const MAX_RECURRENCE_ITERATIONS: u32 = 500;

/// The year enumeration starts from when a recurrence has a `min` FROM year.
pub const EARLIEST_RULE_YEAR: i32 = 1800;

/// The table of every rule set, keyed by name.
pub type RuleSetTable = HashMap<String, RuleSet>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Recurrence {
    /// The owning rule set name, or a formatted abbreviation after [`Recurrence::with_name`].
    pub name: String,
    pub from: RuleYear,
    pub to: RuleYear,
    pub month: Month,
    pub on_date: DayOfMonth,
    pub at: QualifiedTime,
    pub save: Time,
    pub letter: Option<String>,
}

impl Recurrence {
    pub fn savings(&self) -> i64 {
        self.save.as_secs()
    }

    pub fn first_year(&self) -> i32 {
        match self.from {
            RuleYear::Min => EARLIEST_RULE_YEAR,
            year => year.to_i32(),
        }
    }

    /// The last year the recurrence applies to, `None` when unbounded.
    pub fn last_year(&self) -> Option<i32> {
        match self.to {
            RuleYear::Max => None,
            year => Some(year.to_i32()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.to == RuleYear::Max
    }

    pub fn is_active_in(&self, year: i32) -> bool {
        self.from.to_i32() <= year && self.last_year().is_none_or(|last| year <= last)
    }

    fn instant_for_year(&self, year: i32, std_offset: i64, save: i64) -> i64 {
        let epoch_days = epoch_days_for_rule_date(year, self.month, self.on_date);
        epoch_seconds_for_epoch_days(epoch_days) + self.at.to_universal_seconds(std_offset, save)
    }

    /// Returns the transition instant of `year`, or `None` when the year is out of range.
    pub fn transition_for_year(&self, year: i32, std_offset: i64, save: i64) -> Option<i64> {
        self.is_active_in(year)
            .then(|| self.instant_for_year(year, std_offset, save))
    }

    /// Returns the first transition strictly after `after`.
    ///
    /// `save` is the savings in effect before the transition, which wall clock
    /// transitions depend on.
    pub fn next_transition(
        &self,
        after: i64,
        std_offset: i64,
        save: i64,
    ) -> Result<Option<i64>, ZoneInfoError> {
        Ok(self
            .next_transition_from_year(after, std_offset, save, self.first_year())?
            .map(|(_, instant)| instant))
    }

    /// Returns the first transition strictly after `after` that falls in
    /// `min_year` or later, along with its year.
    pub fn next_transition_from_year(
        &self,
        after: i64,
        std_offset: i64,
        save: i64,
        min_year: i32,
    ) -> Result<Option<(i32, i64)>, ZoneInfoError> {
        // Start a year early, the local time may carry over the year boundary.
        let mut year = (year_for_epoch_seconds(after) - 1)
            .max(self.first_year())
            .max(min_year);
        for _ in 0..MAX_RECURRENCE_ITERATIONS {
            if self.last_year().is_some_and(|last| year > last) || year > utils::MAX_YEAR {
                return Ok(None);
            }
            let instant = self.instant_for_year(year, std_offset, save);
            if instant > after {
                return Ok(Some((year, instant)));
            }
            year += 1;
        }
        Err(ZoneInfoError::RecurrenceDidNotTerminate {
            rule_set: self.name.clone(),
            year,
        })
    }

    /// Returns the last transition strictly before `before`.
    pub fn previous_transition(
        &self,
        before: i64,
        std_offset: i64,
        save: i64,
    ) -> Result<Option<i64>, ZoneInfoError> {
        let mut year = year_for_epoch_seconds(before) + 1;
        if let Some(last) = self.last_year() {
            year = year.min(last);
        }
        for _ in 0..MAX_RECURRENCE_ITERATIONS {
            if year < self.first_year() {
                return Ok(None);
            }
            let instant = self.instant_for_year(year, std_offset, save);
            if instant < before {
                return Ok(Some(instant));
            }
            year -= 1;
        }
        Err(ZoneInfoError::RecurrenceDidNotTerminate {
            rule_set: self.name.clone(),
            year,
        })
    }

    /// Returns a copy of the recurrence named with its formatted abbreviation.
    pub fn with_name(
        &self,
        format: &AbbreviationFormat,
        std_offset: i64,
    ) -> Result<Self, ZoneInfoError> {
        let name = format.format(std_offset, self.savings(), self.letter.as_deref())?;
        Ok(Self {
            name,
            ..self.clone()
        })
    }

    /// Parses the columns of a `Rule` line following the record kind.
    pub(crate) fn parse(
        splits: &mut SplitWhitespace<'_>,
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        let name = next_split(splits, ctx)?.to_owned();
        let from = next_split(splits, ctx)?.context_parse::<RuleYear>(ctx)?;
        let to_column = next_split(splits, ctx)?;
        let to = RuleYear::parse_to_year(to_column, from, ctx)?;
        if from > to || from == RuleYear::Max || to == RuleYear::Min {
            let range = format!("{from:?}..{to:?}");
            return Err(ZoneInfoParseError::InvalidYearRange(ctx.line_number, range));
        }
        // The reserved TYPE column
        let _ = next_split(splits, ctx)?;
        let month = next_split(splits, ctx)?.context_parse::<Month>(ctx)?;
        let on_date = next_split(splits, ctx)?
            .context_parse::<DayOfMonth>(ctx)?
            .check_month(month, ctx)?;
        let at = next_split(splits, ctx)?.context_parse::<QualifiedTime>(ctx)?;
        let save = next_split(splits, ctx)?.context_parse::<Time>(ctx)?;
        let letter = match next_split(splits, ctx)? {
            "-" => None,
            letter => Some(letter.to_owned()),
        };
        expect_end(splits, ctx)?;
        Ok(Self {
            name,
            from,
            to,
            month,
            on_date,
            at,
            save,
            letter,
        })
    }
}

pub(crate) fn epoch_days_for_rule_date(year: i32, month: Month, day_of_month: DayOfMonth) -> i64 {
    let day_of_year_for_month = i64::from(month.month_start_to_day_of_year(year));
    let epoch_days = utils::epoch_days_for_year(year) + day_of_year_for_month;
    let is_week_day =
        |offset: i64, week_day| utils::epoch_days_to_week_day(epoch_days + offset) == week_day;
    let day_of_month = match day_of_month {
        DayOfMonth::Last(week_day) => {
            let mut day_of_month =
                i64::from(month.month_end_to_day_of_year(year)) - day_of_year_for_month;
            while !is_week_day(day_of_month, week_day as u8) {
                day_of_month -= 1;
            }
            day_of_month
        }
        DayOfMonth::WeekDayGEThanMonthDay(week_day, d) => {
            let mut day_of_month = i64::from(d) - 1;
            while !is_week_day(day_of_month, week_day as u8) {
                day_of_month += 1;
            }
            day_of_month
        }
        DayOfMonth::WeekDayLEThanMonthDay(week_day, d) => {
            let mut day_of_month = i64::from(d) - 1;
            while !is_week_day(day_of_month, week_day as u8) {
                day_of_month -= 1;
            }
            day_of_month
        }
        DayOfMonth::Day(day) => i64::from(day) - 1,
    };
    epoch_days + day_of_month
}

// ==== RuleSet ====

/// A concrete transition produced by a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTransition {
    pub at: i64,
    /// The rule year the transition belongs to.
    pub year: i32,
    pub savings: i64,
    pub letter: Option<String>,
    /// The index of the recurrence in its rule set.
    pub recurrence: usize,
}

impl RuleTransition {
    /// The formatted abbreviation in effect after this transition.
    pub fn name(
        &self,
        format: &AbbreviationFormat,
        std_offset: i64,
    ) -> Result<String, ZoneInfoError> {
        format.format(std_offset, self.savings, self.letter.as_deref())
    }
}

/// The savings and letter in effect at some instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleState {
    pub savings: i64,
    pub letter: Option<String>,
}

/// The offsets in effect at the end of a zone line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOffsets {
    pub std_offset: i64,
    pub savings: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RuleSet {
    pub name: String,
    recurrences: Vec<Recurrence>,
}

impl RuleSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            recurrences: Vec::default(),
        }
    }

    pub fn from_recurrences(name: &str, recurrences: Vec<Recurrence>) -> Self {
        Self {
            name: name.to_owned(),
            recurrences,
        }
    }

    pub fn push(&mut self, recurrence: Recurrence) {
        self.recurrences.push(recurrence);
    }

    pub fn extend(&mut self, other: RuleSet) {
        self.recurrences.extend(other.recurrences);
    }

    pub fn recurrences(&self) -> &[Recurrence] {
        &self.recurrences
    }

    pub fn recurrences_for_year(&self, year: i32) -> impl Iterator<Item = &Recurrence> {
        self.recurrences.iter().filter(move |r| r.is_active_in(year))
    }

    pub fn unbounded_recurrences(&self) -> impl Iterator<Item = &Recurrence> {
        self.recurrences.iter().filter(|r| r.is_unbounded())
    }

    /// The greatest finite FROM or TO year.
    pub fn last_bounded_year(&self) -> Option<i32> {
        self.recurrences
            .iter()
            .flat_map(|r| [r.from, r.to])
            .filter_map(|year| match year {
                RuleYear::Year(y) => Some(y),
                _ => None,
            })
            .max()
    }

    /// Whether the unbounded recurrences alternate between at least two
    /// distinct savings and letter states.
    pub fn has_alternating_tail(&self) -> bool {
        let mut unbounded = self.unbounded_recurrences();
        let Some(first) = unbounded.next() else {
            return false;
        };
        unbounded.any(|r| r.save != first.save || r.letter != first.letter)
    }

    /// The letter used before any transition: the one of the earliest
    /// recurrence without savings.
    pub fn first_standard_letter(&self) -> Option<&str> {
        self.recurrences
            .iter()
            .enumerate()
            .filter(|(_, r)| r.savings() == 0)
            .min_by_key(|(index, r)| (r.from.to_i32(), *index))
            .and_then(|(_, r)| r.letter.as_deref())
    }

    /// Returns the first transition of the set strictly after `after`.
    pub fn next_transition(
        &self,
        after: i64,
        std_offset: i64,
        savings: i64,
    ) -> Result<Option<RuleTransition>, ZoneInfoError> {
        self.next_transition_after_years(after, std_offset, savings, &[])
    }

    // `emitted` holds, by recurrence index, the last year that recurrence
    // already transitioned in. Those years are not produced again.
    fn next_transition_after_years(
        &self,
        after: i64,
        std_offset: i64,
        savings: i64,
        emitted: &[Option<i32>],
    ) -> Result<Option<RuleTransition>, ZoneInfoError> {
        let after_year = year_for_epoch_seconds(after);
        let mut best: Option<(i64, i32, usize)> = None;
        let mut tied = false;
        for (index, recurrence) in self.recurrences.iter().enumerate() {
            if recurrence
                .last_year()
                .is_some_and(|last| last < after_year - 1)
            {
                continue;
            }
            let min_year = match emitted.get(index).copied().flatten() {
                Some(year) => year.saturating_add(1),
                None => recurrence.first_year(),
            };
            let Some((year, at)) =
                recurrence.next_transition_from_year(after, std_offset, savings, min_year)?
            else {
                continue;
            };
            match best {
                Some((best_at, _, _)) if best_at == at => tied = true,
                Some((best_at, _, _)) if best_at < at => {}
                _ => {
                    best = Some((at, year, index));
                    tied = false;
                }
            }
        }
        if let (true, Some((at, _, _))) = (tied, best) {
            return Err(ZoneInfoError::MalformedRuleSet {
                rule_set: self.name.clone(),
                instant: at,
            });
        }
        Ok(best.map(|(at, year, index)| {
            let recurrence = &self.recurrences[index];
            RuleTransition {
                at,
                year,
                savings: recurrence.savings(),
                letter: recurrence.letter.clone(),
                recurrence: index,
            }
        }))
    }

    /// Returns the transitions strictly after `start`, without an end.
    pub fn transitions(&self, start: i64, std_offset: i64, initial_savings: i64) -> Transitions<'_> {
        self.transitions_in_range(start, i64::MAX, std_offset, initial_savings)
    }

    /// Returns the transitions in `(start, end)`, where every transition is
    /// computed with the savings of the transition before it.
    pub fn transitions_in_range(
        &self,
        start: i64,
        end: i64,
        std_offset: i64,
        initial_savings: i64,
    ) -> Transitions<'_> {
        Transitions {
            rule_set: self,
            cursor: start,
            end,
            std_offset,
            savings: initial_savings,
            emitted: vec![None; self.recurrences.len()],
            done: false,
        }
    }

    /// Returns the savings and letter in effect at `instant`, the start of a zone line.
    ///
    /// The state is simulated forward from the start of time. A transition that
    /// the previous line's offsets put at `instant` has already happened.
    pub fn state_at(
        &self,
        instant: i64,
        std_offset: i64,
        previous: Option<LineOffsets>,
    ) -> Result<RuleState, ZoneInfoError> {
        let fallback = || RuleState {
            savings: 0,
            letter: self.first_standard_letter().map(ToOwned::to_owned),
        };
        if instant == BEGINNING_OF_TIME {
            return Ok(fallback());
        }

        let mut state = None;
        let mut transitions = self.transitions(BEGINNING_OF_TIME, std_offset, 0);
        let following = loop {
            match transitions.next().transpose()? {
                Some(transition) if transition.at <= instant => state = Some(transition),
                following => break following,
            }
        };

        if let (Some(previous), Some(following)) = (previous, following) {
            let recurrence = &self.recurrences[following.recurrence];
            let at = recurrence.next_transition(
                instant.saturating_sub(1),
                previous.std_offset,
                previous.savings,
            )?;
            if at.is_some_and(|at| at <= instant) {
                return Ok(RuleState {
                    savings: following.savings,
                    letter: following.letter,
                });
            }
        }

        Ok(state.map_or_else(fallback, |transition| RuleState {
            savings: transition.savings,
            letter: transition.letter,
        }))
    }
}

/// A lazy, chronological stream of rule set transitions.
#[derive(Debug, Clone)]
pub struct Transitions<'a> {
    rule_set: &'a RuleSet,
    cursor: i64,
    end: i64,
    std_offset: i64,
    savings: i64,
    /// The last year each recurrence transitioned in.
    emitted: Vec<Option<i32>>,
    done: bool,
}

impl Transitions<'_> {
    /// The savings in effect at the current position of the stream.
    pub fn savings(&self) -> i64 {
        self.savings
    }
}

impl Iterator for Transitions<'_> {
    type Item = Result<RuleTransition, ZoneInfoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rule_set.next_transition_after_years(
            self.cursor,
            self.std_offset,
            self.savings,
            &self.emitted,
        ) {
            Ok(Some(transition)) if transition.at < self.end => {
                self.cursor = transition.at;
                self.savings = transition.savings;
                if let Some(year) = self.emitted.get_mut(transition.recurrence) {
                    *year = Some(transition.year);
                }
                Some(Ok(transition))
            }
            Ok(_) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sign, WeekDay};

    const TEST_DATA: [&str; 6] = [
        "Algeria	1916	only	-	Jun	14	23:00s	1:00	S",
        "Algeria	1916	1919	-	Oct	Sun>=1	23:00s	0	-",
        "Algeria	1917	only	-	Mar	24	23:00s	1:00	S",
        "Algeria	1918	only	-	Mar	 9	23:00s	1:00	S",
        "Algeria	1919	only	-	Mar	 1	23:00s	1:00	S",
        "Algeria	1920	only	-	Feb	14	23:00s	1:00	S",
    ];

    fn parse_rule(line: &str) -> Recurrence {
        Recurrence::parse(&mut line.split_whitespace(), &mut LineParseContext::default()).unwrap()
    }

    fn rule_set(name: &str, lines: &[&str]) -> RuleSet {
        RuleSet::from_recurrences(name, lines.iter().map(|l| parse_rule(l)).collect())
    }

    #[test]
    fn rule_test() {
        let data = parse_rule(TEST_DATA[0]);
        assert_eq!(
            data,
            Recurrence {
                name: "Algeria".into(),
                from: RuleYear::Year(1916),
                to: RuleYear::Year(1916),
                month: Month::Jun,
                on_date: DayOfMonth::Day(14),
                at: QualifiedTime::Standard(Time {
                    sign: Sign::Positive,
                    hour: 23,
                    minute: 0,
                    second: 0
                }),
                save: Time {
                    sign: Sign::Positive,
                    hour: 1,
                    minute: 0,
                    second: 0
                },
                letter: Some("S".into()),
            }
        );

        let data = parse_rule(TEST_DATA[1]);
        assert_eq!(data.to, RuleYear::Year(1919));
        assert_eq!(
            data.on_date,
            DayOfMonth::WeekDayGEThanMonthDay(WeekDay::Sun, 1)
        );
        assert_eq!(data.letter, None);
    }

    #[test]
    fn date_calcs() {
        let epoch_days = epoch_days_for_rule_date(2025, Month::Mar, DayOfMonth::Day(29));
        assert_eq!(epoch_days, 20176);
        let epoch_days =
            epoch_days_for_rule_date(2025, Month::Mar, DayOfMonth::Last(WeekDay::Sun));
        assert_eq!(epoch_days, 20177);
        let epoch_days = epoch_days_for_rule_date(1969, Month::Dec, DayOfMonth::Day(31));
        assert_eq!(epoch_days, -1);
        let epoch_days =
            epoch_days_for_rule_date(1969, Month::Dec, DayOfMonth::Last(WeekDay::Sun));
        assert_eq!(epoch_days, -4);
        // 2025-03-09, the second Sunday of March
        let epoch_days = epoch_days_for_rule_date(
            2025,
            Month::Mar,
            DayOfMonth::WeekDayGEThanMonthDay(WeekDay::Sun, 8),
        );
        assert_eq!(epoch_days, 20156);
        // 2025-03-28, the last Friday on or before the 29th
        let epoch_days = epoch_days_for_rule_date(
            2025,
            Month::Mar,
            DayOfMonth::WeekDayLEThanMonthDay(WeekDay::Fri, 29),
        );
        assert_eq!(epoch_days, 20175);
    }

    #[test]
    fn time_modes() {
        let wall = parse_rule("US 2007 max - Mar Sun>=8 2:00 1:00 D");
        let standard = parse_rule("US 2007 max - Mar Sun>=8 2:00s 1:00 D");
        let universal = parse_rule("US 2007 max - Mar Sun>=8 2:00u 1:00 D");
        let midnight = 20156 * 86400;
        assert_eq!(
            wall.transition_for_year(2025, -18000, 3600),
            Some(midnight + 7200 + 18000 - 3600)
        );
        assert_eq!(
            standard.transition_for_year(2025, -18000, 3600),
            Some(midnight + 7200 + 18000)
        );
        assert_eq!(
            universal.transition_for_year(2025, -18000, 3600),
            Some(midnight + 7200)
        );
        assert_eq!(wall.transition_for_year(2006, -18000, 0), None);
    }

    #[test]
    fn next_and_previous_transition() {
        let spring = parse_rule("US 2007 max - Mar Sun>=8 2:00 1:00 D");
        // 2025-03-09T07:00Z
        let t = 1_741_503_600;
        assert_eq!(spring.next_transition(t - 1, -18000, 0).unwrap(), Some(t));
        assert_eq!(
            spring.next_transition(t, -18000, 0).unwrap(),
            Some(1_772_953_200)
        );
        assert_eq!(spring.previous_transition(t + 1, -18000, 0).unwrap(), Some(t));
        assert_eq!(
            spring.previous_transition(t, -18000, 0).unwrap(),
            Some(1_710_054_000)
        );
        assert_eq!(
            spring.next_transition(BEGINNING_OF_TIME, -18000, 0).unwrap(),
            Some(1_173_596_400)
        );
        assert_eq!(
            spring
                .previous_transition(1_173_596_400, -18000, 0)
                .unwrap(),
            None
        );
    }

    #[test]
    fn bounded_recurrence_ends() {
        let rule = parse_rule("US 1967 2006 - Oct lastSun 2:00 0 S");
        let last = rule.transition_for_year(2006, -18000, 3600).unwrap();
        assert_eq!(rule.next_transition(last, -18000, 3600).unwrap(), None);
        assert_eq!(
            rule.next_transition(last + 365 * 86400, -18000, 3600).unwrap(),
            None
        );
        assert_eq!(rule.next_transition(last - 1, -18000, 3600).unwrap(), Some(last));
    }

    #[test]
    fn minimum_year_starts_at_floor() {
        let rule = parse_rule("Old min 1850 - Jan 1 0:00u 0 -");
        assert_eq!(rule.first_year(), EARLIEST_RULE_YEAR);
        assert_eq!(
            rule.next_transition(BEGINNING_OF_TIME, 0, 0).unwrap(),
            Some(utils::epoch_seconds_for_year(EARLIEST_RULE_YEAR))
        );
    }

    #[test]
    fn names() {
        let rule = parse_rule("US 2007 max - Mar Sun>=8 2:00 1:00 D");
        let named = rule
            .with_name(&AbbreviationFormat::Letter("E%sT".into()), -18000)
            .unwrap();
        assert_eq!(named.name, "EDT");
        assert_eq!(named.save, rule.save);
    }

    #[test]
    fn alternating_stream() {
        let rules = rule_set(
            "Foo",
            &[
                "Foo 1990 max - Oct lastSun 2:00 0 -",
                "Foo 1990 max - Apr Sun>=1 2:00 1:00 D",
            ],
        );
        assert!(rules.has_alternating_tail());
        assert_eq!(rules.last_bounded_year(), Some(1990));
        let start = utils::epoch_seconds_for_year(1990);
        let end = utils::epoch_seconds_for_year(2001);
        let transitions = rules
            .transitions_in_range(start, end, 0, 0)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(transitions.len(), 22);
        assert!(transitions.windows(2).all(|w| w[0].at < w[1].at));
        for pair in transitions.chunks(2) {
            assert_eq!(pair[0].savings, 3600);
            assert_eq!(pair[1].savings, 0);
            // The October transition happens at 2:00 daylight time.
            assert_eq!(pair[1].at.rem_euclid(86400), 3600);
        }
        let october_years = transitions
            .iter()
            .filter(|t| t.recurrence == 0)
            .map(|t| t.year)
            .collect::<Vec<_>>();
        assert_eq!(october_years, (1990..=2000).collect::<Vec<_>>());
    }

    #[test]
    fn wall_time_rule_fires_once_per_year() {
        // Ending daylight time at a wall clock time moves the instant later
        // once the savings are gone.
        let rules = rule_set(
            "EU",
            &[
                "EU 1981 max - Mar lastSu 1:00u 1:00 S",
                "EU 1996 max - Oct lastSu 2:00 0 -",
            ],
        );
        let start = utils::epoch_seconds_for_year(2020);
        let end = utils::epoch_seconds_for_year(2025);
        let transitions = rules
            .transitions_in_range(start, end, 3600, 0)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(transitions.len(), 10);
        assert!(transitions.windows(2).all(|w| w[0].savings != w[1].savings));
    }

    #[test]
    fn unreachable_transition_does_not_terminate() {
        // A thousand year offset puts every wall clock transition before
        // `after` for longer than the search is allowed to run.
        let std_offset = 1000 * 365 * 86400;
        let rule = parse_rule("Far 1990 max - Apr 1 2:00 1:00 D");
        assert!(matches!(
            rule.next_transition(0, std_offset, 0),
            Err(ZoneInfoError::RecurrenceDidNotTerminate { .. })
        ));

        let rules = RuleSet::from_recurrences("Far", vec![rule]);
        let mut transitions = rules.transitions(0, std_offset, 0);
        assert!(matches!(
            transitions.next(),
            Some(Err(ZoneInfoError::RecurrenceDidNotTerminate { .. }))
        ));
        assert!(transitions.next().is_none());
    }

    #[test]
    fn day_past_month_end_is_rejected() {
        let mut ctx = LineParseContext::default();
        let line = "Bad 2000 max - Feb 31 2:00 0 -";
        assert!(matches!(
            Recurrence::parse(&mut line.split_whitespace(), &mut ctx),
            Err(ZoneInfoParseError::UnknownValue(..))
        ));
        let leap = parse_rule("Leap 1948 o - Feb 29 2s 1 S");
        assert_eq!(leap.on_date, DayOfMonth::Day(29));
    }

    #[test]
    fn simultaneous_transitions_are_malformed() {
        let rules = rule_set(
            "Bad",
            &[
                "Bad 2000 max - Apr 1 2:00 1:00 D",
                "Bad 2000 max - Apr 1 2:00 0 S",
            ],
        );
        let err = rules.next_transition(BEGINNING_OF_TIME, 0, 0);
        assert!(matches!(
            err,
            Err(ZoneInfoError::MalformedRuleSet { .. })
        ));
    }

    #[test]
    fn state_at_line_start() {
        let rules = rule_set(
            "US",
            &[
                "US 1967 2006 - Oct lastSun 2:00 0 S",
                "US 1967 1973 - Apr lastSun 2:00 1:00 D",
                "US 1974 o - Ja 6 2:00 1:00 D",
                "US 1975 o - F lastSun 2:00 1:00 D",
                "US 1976 1986 - Apr lastSun 2:00 1:00 D",
                "US 1987 2006 - Apr Sun>=1 2:00 1:00 D",
                "US 2007 max - Mar Sun>=8 2:00 1:00 D",
                "US 2007 max - Nov Sun>=1 2:00 0 S",
            ],
        );
        assert_eq!(rules.first_standard_letter(), Some("S"));
        assert_eq!(
            rules.state_at(BEGINNING_OF_TIME, -18000, None).unwrap(),
            RuleState {
                savings: 0,
                letter: Some("S".into())
            }
        );
        // 2025-07-01T12:00Z
        assert_eq!(
            rules.state_at(1_751_371_200, -18000, None).unwrap(),
            RuleState {
                savings: 3600,
                letter: Some("D".into())
            }
        );
        // Before the first transition.
        assert_eq!(
            rules.state_at(0 - 100 * 365 * 86400, -18000, None).unwrap(),
            RuleState {
                savings: 0,
                letter: Some("S".into())
            }
        );
    }

    #[test]
    fn state_at_simultaneous_line_change() {
        let rules = rule_set(
            "R",
            &[
                "R 1989 o - Mar lastSu 2s 1 S",
                "R 1989 o - S lastSu 2s 0 -",
            ],
        );
        // 1989-03-26T02:00 local standard time with the previous line's +04
        // offset, the instant a zone line switching to +03 starts.
        let start = utils::epoch_seconds_for_epoch_days(epoch_days_for_rule_date(
            1989,
            Month::Mar,
            DayOfMonth::Last(WeekDay::Sun),
        )) + 7200
            - 14400;
        let previous = LineOffsets {
            std_offset: 14400,
            savings: 0,
        };
        assert_eq!(
            rules.state_at(start, 10800, Some(previous)).unwrap().savings,
            3600
        );
        assert_eq!(rules.state_at(start, 10800, None).unwrap().savings, 0);
    }
}
