//! Zone info compiler functionality
//!
//! This module contains the zone info compiler logic, which turns a
//! [`ZoneRecord`] and the rule sets it references into a [`CompiledZone`].
//!

use alloc::{
    borrow::ToOwned,
    collections::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    compiled::{CompiledZone, TailRule, ZoneInterval},
    rule::{LineOffsets, RuleSet, RuleSetTable, RuleState},
    types::RuleIdentifier,
    utils::year_for_epoch_seconds,
    zone::{ZoneLine, ZoneRecord},
    ZoneInfoData, ZoneInfoError, BEGINNING_OF_TIME,
};

/// The maximum amount of explicit intervals for a single zone.
pub const MAX_ZONE_INTERVALS: usize = 100_000;

/// The `CompiledZoneMap` struct contains a mapping of zone identifiers (AKA IANA identifiers) to
/// the zone's `CompiledZone`, along with the zones that failed to compile.
#[derive(Debug, Default)]
pub struct CompiledZoneMap {
    pub data: BTreeMap<String, CompiledZone>,
    pub errors: Vec<(String, ZoneInfoError)>,
}

/// The compiler for turning `ZoneInfoData` into `CompiledZone`s
pub struct ZoneInfoCompiler<'data> {
    data: &'data ZoneInfoData,
}

impl<'data> ZoneInfoCompiler<'data> {
    /// Create a new `ZoneInfoCompiler` instance with provided `ZoneInfoData`.
    pub fn new(data: &'data ZoneInfoData) -> Self {
        Self { data }
    }

    /// Compiles a single zone, returning `None` for an unknown identifier.
    pub fn compile_zone(&self, target: &str) -> Option<Result<CompiledZone, ZoneInfoError>> {
        let record = self.data.zones.get(target)?;
        Some(ZoneCompiler::new(target, &self.data.rules).compile(record))
    }

    /// Compiles every zone sequentially.
    pub fn build(&self) -> CompiledZoneMap {
        let mut output = CompiledZoneMap::default();
        for (identifier, record) in &self.data.zones {
            match ZoneCompiler::new(identifier, &self.data.rules).compile(record) {
                Ok(zone) => {
                    let _ = output.data.insert(identifier.clone(), zone);
                }
                Err(err) => output.errors.push((identifier.clone(), err)),
            }
        }
        output
    }
}

/// Collects the intervals of a zone, collapsing adjacent spans that share a
/// wall offset and name.
#[derive(Debug, Default)]
struct IntervalBuilder {
    intervals: Vec<ZoneInterval>,
}

impl IntervalBuilder {
    fn push(
        &mut self,
        start: i64,
        end: i64,
        std_offset: i64,
        savings: i64,
        name: String,
    ) -> Result<(), &'static str> {
        if end < start {
            return Err("zone lines are not in chronological order");
        }
        if end == start {
            return Ok(());
        }
        match self.intervals.last_mut() {
            None if start != BEGINNING_OF_TIME => {
                return Err("the zone does not start at the beginning of time")
            }
            None => {}
            Some(last) if last.end != start => return Err("zone lines leave a gap"),
            Some(last) if last.wall_offset() == std_offset + savings && last.name == name => {
                last.end = end;
                return Ok(());
            }
            Some(_) => {}
        }
        if self.intervals.len() >= MAX_ZONE_INTERVALS {
            return Err("the zone exceeds the interval limit");
        }
        self.intervals.push(ZoneInterval {
            start,
            end,
            std_offset,
            savings,
            name,
        });
        Ok(())
    }
}

enum LineEnd {
    Until { end: i64, savings: i64 },
    Tail(TailRule),
}

/// Compiles the lines of one zone.
pub struct ZoneCompiler<'a> {
    name: &'a str,
    rules: &'a RuleSetTable,
    intervals: IntervalBuilder,
}

impl<'a> ZoneCompiler<'a> {
    pub fn new(name: &'a str, rules: &'a RuleSetTable) -> Self {
        Self {
            name,
            rules,
            intervals: IntervalBuilder::default(),
        }
    }

    fn malformed(&self, reason: impl ToString) -> ZoneInfoError {
        ZoneInfoError::MalformedZone {
            zone: self.name.to_owned(),
            reason: reason.to_string(),
        }
    }

    fn push(
        &mut self,
        start: i64,
        end: i64,
        std_offset: i64,
        savings: i64,
        name: String,
    ) -> Result<(), ZoneInfoError> {
        self.intervals
            .push(start, end, std_offset, savings, name)
            .map_err(|reason| self.malformed(reason))
    }

    pub fn compile(mut self, record: &ZoneRecord) -> Result<CompiledZone, ZoneInfoError> {
        let last_index = record
            .lines
            .len()
            .checked_sub(1)
            .ok_or_else(|| self.malformed("the zone has no lines"))?;
        let rules = self.rules;

        let mut start = BEGINNING_OF_TIME;
        let mut previous = None;
        for (index, line) in record.lines.iter().enumerate() {
            let is_last = index == last_index;
            if !is_last && line.until.is_none() {
                return Err(self.malformed(format!(
                    "line {} is open ended but is not the last line",
                    line.line_number
                )));
            }
            let line_end = match &line.rule {
                RuleIdentifier::None => self.compile_fixed(line, start, 0)?,
                RuleIdentifier::Numeric(save) => self.compile_fixed(line, start, save.as_secs())?,
                RuleIdentifier::Named(id) => {
                    let rule_set = rules
                        .get(id)
                        .ok_or_else(|| self.malformed(format!("unknown rule set `{id}`")))?;
                    self.compile_rules(line, rule_set, start, previous, is_last)?
                }
            };
            match line_end {
                LineEnd::Until { end, savings } => {
                    start = end;
                    previous = Some(LineOffsets {
                        std_offset: line.std_offset.as_secs(),
                        savings,
                    });
                }
                LineEnd::Tail(tail) => return self.finish(Some(tail)),
            }
        }
        self.finish(None)
    }

    fn finish(self, tail: Option<TailRule>) -> Result<CompiledZone, ZoneInfoError> {
        let starts_at_floor = self
            .intervals
            .intervals
            .first()
            .is_some_and(|first| first.start == BEGINNING_OF_TIME);
        if !starts_at_floor {
            return Err(self.malformed("the zone does not start at the beginning of time"));
        }
        Ok(CompiledZone {
            intervals: self.intervals.intervals,
            tail,
        })
    }

    fn compile_fixed(
        &mut self,
        line: &ZoneLine,
        start: i64,
        savings: i64,
    ) -> Result<LineEnd, ZoneInfoError> {
        let std_offset = line.std_offset.as_secs();
        let name = line.format.format(std_offset, savings, None)?;
        let end = line.until_instant(savings);
        self.push(start, end, std_offset, savings, name)?;
        Ok(LineEnd::Until { end, savings })
    }

    fn compile_rules(
        &mut self,
        line: &ZoneLine,
        rule_set: &RuleSet,
        start: i64,
        previous: Option<LineOffsets>,
        is_last: bool,
    ) -> Result<LineEnd, ZoneInfoError> {
        let std_offset = line.std_offset.as_secs();
        let RuleState {
            mut savings,
            letter,
        } = rule_set.state_at(start, std_offset, previous)?;
        let mut name = line.format.format(std_offset, savings, letter.as_deref())?;

        // Transitions past this year are left to the tail.
        let cutoff_year = (is_last
            && line.until.is_none()
            && rule_set.unbounded_recurrences().next().is_some())
        .then(|| {
            let start_year = year_for_epoch_seconds(start);
            rule_set
                .last_bounded_year()
                .map_or(start_year, |year| year.max(start_year))
        });

        let mut segment_start = start;
        for transition in rule_set.transitions(start, std_offset, savings) {
            let transition = transition?;
            if transition.at >= line.until_instant(savings) {
                break;
            }
            let past_cutoff =
                cutoff_year.is_some_and(|cutoff| year_for_epoch_seconds(transition.at) > cutoff);

            self.push(segment_start, transition.at, std_offset, savings, name)?;
            segment_start = transition.at;
            savings = transition.savings;
            name = transition.name(&line.format, std_offset)?;

            if past_cutoff {
                if rule_set.has_alternating_tail() {
                    let recurrences = rule_set.unbounded_recurrences().cloned().collect();
                    return Ok(LineEnd::Tail(TailRule {
                        start: transition.at,
                        std_offset,
                        format: line.format.clone(),
                        initial_savings: transition.savings,
                        initial_letter: transition.letter,
                        rules: RuleSet::from_recurrences(&rule_set.name, recurrences),
                    }));
                }
                // Only a single repeating state remains.
                break;
            }
        }

        let end = line.until_instant(savings);
        self.push(segment_start, end, std_offset, savings, name)?;
        Ok(LineEnd::Until { end, savings })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::ZoneInfoCompiler;
    use crate::{
        compiled::CompiledZone, parser::ZoneInfoParser, utils, ZoneInfoError, BEGINNING_OF_TIME,
        END_OF_TIME,
    };

    fn compile(source: &str, zone: &str) -> Result<CompiledZone, ZoneInfoError> {
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        assert!(data.errors.is_empty(), "{:?}", data.errors);
        ZoneInfoCompiler::new(&data).compile_zone(zone).unwrap()
    }

    fn assert_total(zone: &CompiledZone) {
        assert_eq!(zone.intervals[0].start, BEGINNING_OF_TIME);
        assert!(zone.intervals.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn fixed_lines() {
        let zone = compile(
            "Z Test/Fixed 1 - A 2000\n2 1 B 2010\n3 - C\n",
            "Test/Fixed",
        )
        .unwrap();
        assert_total(&zone);
        let year_2000 = utils::epoch_seconds_for_year(2000);
        let year_2010 = utils::epoch_seconds_for_year(2010);
        let summary = zone
            .intervals
            .iter()
            .map(|i| (i.end, i.wall_offset(), i.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            [
                (year_2000 - 3600, 3600, "A"),
                (year_2010 - 10800, 10800, "B"),
                (END_OF_TIME, 10800, "C"),
            ]
        );
        assert!(zone.tail.is_none());
        assert!(zone.intervals[1].is_dst());
    }

    #[test]
    fn identical_spans_collapse() {
        let zone = compile("Z Test/Same 1 - A 2000\n0 1 A\n", "Test/Same").unwrap();
        assert_eq!(zone.intervals.len(), 1);
        assert_eq!(zone.intervals[0].end, END_OF_TIME);
    }

    #[test]
    fn alternating_rules_become_a_tail() {
        let source = "R Foo 1990 max - Oct lastSun 2:00 0 -
R Foo 1990 max - Apr Sun>=1 2:00 1:00 D
Z Test/Foo 0 Foo F%sT
";
        let zone = compile(source, "Test/Foo").unwrap();
        assert_total(&zone);
        let names = zone
            .intervals
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["FT", "FDT", "FT"]);
        let tail = zone.tail.as_ref().unwrap();
        // 1991-04-07T02:00Z
        assert_eq!(tail.start, 670_989_600);
        assert_eq!(zone.intervals[2].end, tail.start);
        assert_eq!(tail.initial_savings, 3600);
        assert_eq!(tail.rules.recurrences().len(), 2);

        let mut instant = utils::epoch_seconds_for_year(1990);
        let mut transitions = Vec::new();
        while let Some(next) = zone.next_transition(instant).unwrap() {
            if next >= utils::epoch_seconds_for_year(2001) {
                break;
            }
            transitions.push(next);
            instant = next;
        }
        assert_eq!(transitions.len(), 22);
        assert!(transitions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn single_repeating_rule_has_no_tail() {
        let source = "R One 2000 max - Jan 1 0 1 S\nZ Test/One 0 One X%sT\n";
        let zone = compile(source, "Test/One").unwrap();
        assert!(zone.tail.is_none());
        assert_eq!(zone.intervals.len(), 2);
        assert_eq!(zone.intervals[1].start, utils::epoch_seconds_for_year(2000));
        assert_eq!(zone.intervals[1].end, END_OF_TIME);
        assert_eq!(zone.intervals[1].name, "XST");
    }

    #[test]
    fn malformed_zones() {
        let unknown = compile("Z Test/Unknown 0 Nope N%sT\n", "Test/Unknown");
        assert!(matches!(unknown, Err(ZoneInfoError::MalformedZone { .. })));

        let backwards = compile("Z Test/Back 0 - A 2000\n0 - B 1990\n0 - C\n", "Test/Back");
        assert!(matches!(backwards, Err(ZoneInfoError::MalformedZone { .. })));

        let bad_format = compile("Z Test/Bad 0 - %q\n", "Test/Bad");
        assert!(matches!(bad_format, Err(ZoneInfoError::InvalidNameFormat(_))));
    }

    #[test]
    fn build_collects_errors() {
        let source = "Z Test/Good 0 - G\nZ Test/Bad 0 Nope N%sT\n";
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        let compiled = ZoneInfoCompiler::new(&data).build();
        assert!(compiled.data.contains_key("Test/Good"));
        assert_eq!(compiled.errors.len(), 1);
        assert_eq!(compiled.errors[0].0, "Test/Bad");
        assert!(ZoneInfoCompiler::new(&data).compile_zone("Test/Missing").is_none());
    }
}
