//! Zoneinfo source parsing
//!
//! Parsing happens one logical line at a time with [`Record::parse`]. The
//! [`ZoneInfoParser`] walks a complete source, grouping zone headers with their
//! continuation lines and collecting any malformed lines as diagnostics.

use core::{
    fmt,
    num::ParseIntError,
    str::{Lines, SplitWhitespace},
};

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};

use crate::{
    rule::{Recurrence, RuleSet},
    types::match_keyword,
    zone::{ZoneLine, ZoneRecord},
    Link, ZoneInfoData,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneInfoParseError {
    UnknownRecordKind(u32, String),
    MissingIdentifier(u32),
    UnexpectedEndOfLine(u32, &'static str),
    UnexpectedToken(u32, &'static str, String),
    UnknownValue(u32, &'static str, String),
    ParseIntError(u32, ParseIntError, &'static str),
    InvalidYearRange(u32, String),
    DuplicateIdentifier(u32, String),
}

impl ZoneInfoParseError {
    pub(crate) fn unknown(s: &str, ctx: &LineParseContext) -> Self {
        Self::UnknownValue(ctx.line_number, ctx.span(), s.to_owned())
    }

    pub(crate) fn unexpected_eol(ctx: &LineParseContext) -> Self {
        Self::UnexpectedEndOfLine(ctx.line_number, ctx.span())
    }

    /// The line the error was found on.
    pub fn line_number(&self) -> u32 {
        match self {
            Self::UnknownRecordKind(line, _)
            | Self::MissingIdentifier(line)
            | Self::UnexpectedEndOfLine(line, _)
            | Self::UnexpectedToken(line, _, _)
            | Self::UnknownValue(line, _, _)
            | Self::ParseIntError(line, _, _)
            | Self::InvalidYearRange(line, _)
            | Self::DuplicateIdentifier(line, _) => *line,
        }
    }
}

impl fmt::Display for ZoneInfoParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecordKind(line, kind) => {
                write!(f, "line {line}: unknown record kind `{kind}`")
            }
            Self::MissingIdentifier(line) => write!(f, "line {line}: missing identifier"),
            Self::UnexpectedEndOfLine(line, span) => {
                write!(f, "line {line}: unexpected end of line while parsing {span}")
            }
            Self::UnexpectedToken(line, span, token) => {
                write!(f, "line {line}: unexpected token `{token}` after {span}")
            }
            Self::UnknownValue(line, span, value) => {
                write!(f, "line {line}: unknown value `{value}` for {span}")
            }
            Self::ParseIntError(line, err, span) => {
                write!(f, "line {line}: {err} while parsing {span}")
            }
            Self::InvalidYearRange(line, range) => {
                write!(f, "line {line}: FROM year is after TO year ({range})")
            }
            Self::DuplicateIdentifier(line, id) => {
                write!(f, "line {line}: `{id}` is already defined")
            }
        }
    }
}

impl core::error::Error for ZoneInfoParseError {}

pub trait TryFromStr<C>: Sized {
    type Error;
    fn try_from_str(s: &str, context: &mut C) -> Result<Self, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct LineParseContext {
    pub line_number: u32,
    pub spans: Vec<&'static str>,
}

impl LineParseContext {
    pub fn enter(&mut self, name: &'static str) {
        self.spans.push(name);
    }

    pub fn span(&self) -> &'static str {
        self.spans.last().copied().unwrap_or("undefined")
    }

    pub fn exit(&mut self) {
        self.spans.pop();
    }

    /// Moves the context onto the next line, dropping any spans left behind by an error.
    pub fn next_line(&mut self) {
        self.line_number += 1;
        self.spans.truncate(1);
    }
}

impl Default for LineParseContext {
    fn default() -> Self {
        Self {
            line_number: 0,
            spans: vec!["undefined"],
        }
    }
}

pub trait ContextParse {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error>;
}

impl ContextParse for &str {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error> {
        T::try_from_str(self, ctx)
    }
}

impl ContextParse for String {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error> {
        T::try_from_str(self, ctx)
    }
}

macro_rules! int_from_str {
    ($($ty:ty),*) => {
        $(
            impl TryFromStr<LineParseContext> for $ty {
                type Error = ZoneInfoParseError;
                fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
                    s.parse::<$ty>()
                        .map_err(|e| ZoneInfoParseError::ParseIntError(ctx.line_number, e, ctx.span()))
                }
            }
        )*
    };
}

int_from_str!(u8, u16, i32);

pub(crate) fn next_split<'a>(
    splits: &mut SplitWhitespace<'a>,
    context: &LineParseContext,
) -> Result<&'a str, ZoneInfoParseError> {
    splits
        .next()
        .ok_or_else(|| ZoneInfoParseError::unexpected_eol(context))
}

pub(crate) fn expect_end(
    splits: &mut SplitWhitespace<'_>,
    context: &LineParseContext,
) -> Result<(), ZoneInfoParseError> {
    match splits.next() {
        Some(token) => Err(ZoneInfoParseError::UnexpectedToken(
            context.line_number,
            context.span(),
            token.to_owned(),
        )),
        None => Ok(()),
    }
}

pub(crate) fn remove_comments(line: &str) -> &str {
    if let Some((cleaned, _comment)) = line.split_once('#') {
        cleaned
    } else {
        line
    }
}

// ==== Records ====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Rule,
    Zone,
    Link,
}

impl RecordKind {
    const KEYWORDS: [(&'static str, RecordKind); 3] = [
        ("Rule", Self::Rule),
        ("Zone", Self::Zone),
        ("Link", Self::Link),
    ];
}

/// A single typed zoneinfo line.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A `Rule` line, carrying its rule set name in [`Recurrence::name`].
    Rule(Recurrence),
    /// A `Zone` header line.
    Zone { name: String, line: ZoneLine },
    /// A zone continuation line.
    Continuation(ZoneLine),
    /// A `Link TARGET LINK-NAME` line.
    Link(Link),
}

impl Record {
    /// Parses one line of zoneinfo source.
    ///
    /// `continuation` should be set when the previous zone line carried an UNTIL.
    /// Blank and comment only lines return `Ok(None)`.
    pub fn parse(
        line: &str,
        continuation: bool,
        ctx: &mut LineParseContext,
    ) -> Result<Option<Self>, ZoneInfoParseError> {
        let mut splits = remove_comments(line).split_whitespace();
        let Some(first) = splits.clone().next() else {
            return Ok(None);
        };

        if continuation {
            ctx.enter("Continuation");
            let line = ZoneLine::parse(&mut splits, ctx)?;
            ctx.exit();
            return Ok(Some(Self::Continuation(line)));
        }

        let kind = match_keyword(first, &RecordKind::KEYWORDS, ctx)
            .map_err(|_| ZoneInfoParseError::UnknownRecordKind(ctx.line_number, first.to_owned()))?;
        let _ = splits.next();

        let record = match kind {
            RecordKind::Rule => {
                ctx.enter("Rule");
                Self::Rule(Recurrence::parse(&mut splits, ctx)?)
            }
            RecordKind::Zone => {
                ctx.enter("Zone");
                let name = splits
                    .next()
                    .ok_or(ZoneInfoParseError::MissingIdentifier(ctx.line_number))?;
                let line = ZoneLine::parse(&mut splits, ctx)?;
                Self::Zone {
                    name: name.to_owned(),
                    line,
                }
            }
            RecordKind::Link => {
                ctx.enter("Link");
                let target = next_split(&mut splits, ctx)?;
                let alias = next_split(&mut splits, ctx)?;
                expect_end(&mut splits, ctx)?;
                Self::Link(Link {
                    target: target.to_owned(),
                    alias: alias.to_owned(),
                    line_number: ctx.line_number,
                })
            }
        };
        ctx.exit();
        Ok(Some(record))
    }
}

// ==== Batch parsing ====

enum ZoneState {
    Idle,
    Collecting(String, ZoneRecord),
    /// A broken zone whose remaining continuation lines are skipped.
    Discarding,
}

impl ZoneState {
    fn expects_continuation(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[non_exhaustive]
pub struct ZoneInfoParser<'data> {
    lines: Lines<'data>,
}

impl<'data> ZoneInfoParser<'data> {
    /// Creates a parser from a `&str`
    pub fn from_zoneinfo_str(source: &'data str) -> Self {
        Self {
            lines: source.lines(),
        }
    }

    /// Parses every line of the source.
    ///
    /// Malformed lines never abort parsing, they are collected into
    /// [`ZoneInfoData::errors`].
    pub fn parse(self) -> ZoneInfoData {
        let mut data = ZoneInfoData::default();
        let mut context = LineParseContext::default();
        let mut state = ZoneState::Idle;

        for line in self.lines {
            context.next_line();
            let token_count = remove_comments(line).split_whitespace().count();
            if token_count == 0 {
                continue;
            }

            if matches!(state, ZoneState::Discarding) {
                // A continuation of at least 4 columns has an UNTIL.
                if token_count < 4 {
                    state = ZoneState::Idle;
                }
                continue;
            }

            match Record::parse(line, state.expects_continuation(), &mut context) {
                Ok(None) => {}
                Ok(Some(Record::Rule(recurrence))) => {
                    data.rules
                        .entry(recurrence.name.clone())
                        .or_insert_with(|| RuleSet::new(&recurrence.name))
                        .push(recurrence);
                }
                Ok(Some(Record::Zone { name, line })) => {
                    let is_open = line.until.is_none();
                    let record = ZoneRecord::new(line);
                    state = if is_open {
                        data.insert_zone(name, record);
                        ZoneState::Idle
                    } else {
                        ZoneState::Collecting(name, record)
                    };
                }
                Ok(Some(Record::Continuation(line))) => {
                    let is_open = line.until.is_none();
                    if let ZoneState::Collecting(_, record) = &mut state {
                        record.lines.push(line);
                    }
                    if is_open {
                        if let ZoneState::Collecting(name, record) =
                            core::mem::replace(&mut state, ZoneState::Idle)
                        {
                            data.insert_zone(name, record);
                        }
                    }
                }
                Ok(Some(Record::Link(link))) => data.insert_link(link),
                Err(err) => {
                    let was_collecting = state.expects_continuation();
                    let first = remove_comments(line).split_whitespace().next();
                    let is_header = !was_collecting
                        && first.is_some_and(|kind| {
                            match_keyword(kind, &RecordKind::KEYWORDS, &context)
                                .is_ok_and(|k| k == RecordKind::Zone)
                        });
                    // Zone headers have two columns ahead of the UNTIL.
                    state = if (was_collecting && token_count >= 4)
                        || (is_header && token_count >= 6)
                    {
                        ZoneState::Discarding
                    } else {
                        ZoneState::Idle
                    };
                    data.errors.push(err);
                }
            }
        }

        // The source ended while a zone still expected a continuation. Its
        // coverage stops at the last UNTIL.
        if let ZoneState::Collecting(name, record) = state {
            data.insert_zone(name, record);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::{LineParseContext, Record, ZoneInfoParseError, ZoneInfoParser};
    use crate::types::{
        AbbreviationFormat, DayOfMonth, Month, QualifiedTime, RuleIdentifier, RuleYear, Time,
        WeekDay,
    };

    const COMPACT: &str = "# version 2025b
R NY 1920 1921 - Mar lastSu 2 1 D
R NY 1920 o - O lastSu 2 0 S
Z America/New_York -4:56:2 - LMT 1883 N 18 17u
-5 NY E%sT 1920
-5 u E%sT
L America/New_York US/Eastern
";

    #[test]
    fn compact_records() {
        let mut ctx = LineParseContext::default();
        ctx.next_line();
        let rule = Record::parse("R NY 1920 o - O lastSu 2 0 S", false, &mut ctx)
            .unwrap()
            .unwrap();
        let Record::Rule(recurrence) = rule else {
            panic!("expected a rule record");
        };
        assert_eq!(recurrence.name, "NY");
        assert_eq!(recurrence.from, RuleYear::Year(1920));
        assert_eq!(recurrence.to, RuleYear::Year(1920));
        assert_eq!(recurrence.month, Month::Oct);
        assert_eq!(recurrence.on_date, DayOfMonth::Last(WeekDay::Sun));
        assert_eq!(recurrence.at, QualifiedTime::Local(Time::from_secs(7200)));
        assert_eq!(recurrence.save.as_secs(), 0);
        assert_eq!(recurrence.letter.as_deref(), Some("S"));

        let zone = Record::parse(
            "Z America/New_York -4:56:2 - LMT 1883 N 18 17u",
            false,
            &mut ctx,
        )
        .unwrap()
        .unwrap();
        let Record::Zone { name, line } = zone else {
            panic!("expected a zone record");
        };
        assert_eq!(name, "America/New_York");
        assert_eq!(line.std_offset.as_secs(), -17762);
        assert_eq!(line.rule, RuleIdentifier::None);
        assert_eq!(line.format, AbbreviationFormat::Literal("LMT".into()));
        let until = line.until.unwrap();
        assert_eq!(until.date.year, 1883);
        assert_eq!(until.date.month, Month::Nov);
        assert_eq!(until.date.day, DayOfMonth::Day(18));
        assert_eq!(until.time, QualifiedTime::Universal(Time::from_secs(61200)));
    }

    #[test]
    fn continuation_lines() {
        let mut ctx = LineParseContext::default();
        let record = Record::parse("\t\t\t-5:00\t1:00\tEDT\t1945 Sep 30 2:00", true, &mut ctx)
            .unwrap()
            .unwrap();
        let Record::Continuation(line) = record else {
            panic!("expected a continuation");
        };
        assert_eq!(line.rule, RuleIdentifier::Numeric(Time::from_secs(3600)));
        assert!(line.until.is_some());

        // Numeric savings may be negative.
        let record = Record::parse("1 -1 GMT", true, &mut ctx).unwrap().unwrap();
        let Record::Continuation(line) = record else {
            panic!("expected a continuation");
        };
        assert_eq!(line.rule, RuleIdentifier::Numeric(Time::from_secs(-3600)));
        assert!(line.until.is_none());
    }

    #[test]
    fn malformed_lines() {
        let mut ctx = LineParseContext::default();
        ctx.next_line();
        // Missing the LETTER column.
        let err = Record::parse("Rule US 1967 2006 - Oct lastSun 2:00 0", false, &mut ctx);
        assert!(matches!(
            err,
            Err(ZoneInfoParseError::UnexpectedEndOfLine(1, _))
        ));

        ctx.next_line();
        let err = Record::parse("Rule US 1967 2006 - Ju lastSun 2:00 0 S", false, &mut ctx);
        assert!(matches!(err, Err(ZoneInfoParseError::UnknownValue(2, _, _))));

        ctx.next_line();
        let err = Record::parse("Rule US 2007 1967 - Oct lastSun 2:00 0 S", false, &mut ctx);
        assert!(matches!(
            err,
            Err(ZoneInfoParseError::InvalidYearRange(3, _))
        ));

        ctx.next_line();
        let err = Record::parse("Leap 2016 Dec 31 23:59:60 + S", false, &mut ctx);
        assert!(matches!(
            err,
            Err(ZoneInfoParseError::UnknownRecordKind(4, _))
        ));

        ctx.next_line();
        let err = Record::parse("Link Europe/London GB extra", false, &mut ctx);
        assert!(matches!(
            err,
            Err(ZoneInfoParseError::UnexpectedToken(5, _, _))
        ));

        assert_eq!(Record::parse("   # comment", false, &mut ctx), Ok(None));
    }

    #[test]
    fn batch_parse() {
        let data = ZoneInfoParser::from_zoneinfo_str(COMPACT).parse();
        assert!(data.errors.is_empty(), "{:?}", data.errors);
        assert_eq!(data.rules["NY"].recurrences().len(), 2);
        let zone = &data.zones["America/New_York"];
        assert_eq!(zone.line_number, 4);
        assert_eq!(zone.lines.len(), 3);
        assert_eq!(zone.lines[2].line_number, 6);
        assert_eq!(data.links["US/Eastern"].target, "America/New_York");
    }

    #[test]
    fn broken_zone_is_dropped_as_a_whole() {
        let source = "Z Broken/Zone -4:56:2 - LMT 1883 Nv 18 12:03:58
-5 u E%sT 1920
-5 - EST
Z Good/Zone 0 - GMT
R X 1990 max - Ap Su>=1 2 1 D
R X 1990 max - Oct lastSu 2 0 -
";
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        assert_eq!(data.errors.len(), 1);
        assert_eq!(data.errors[0].line_number(), 1);
        assert!(!data.zones.contains_key("Broken/Zone"));
        assert!(data.zones.contains_key("Good/Zone"));
        assert_eq!(data.rules["X"].recurrences().len(), 2);
    }

    #[test]
    fn duplicate_zone_keeps_first() {
        let source = "Z Etc/Test 0 - A\nZ Etc/Test 1 - B\n";
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        assert!(matches!(
            data.errors.as_slice(),
            [ZoneInfoParseError::DuplicateIdentifier(2, _)]
        ));
        assert_eq!(
            data.zones["Etc/Test"].lines[0].format,
            AbbreviationFormat::Literal("A".into())
        );
    }
}
