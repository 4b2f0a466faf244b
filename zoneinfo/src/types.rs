//! Zoneinfo types

use core::fmt::Write;

use alloc::{borrow::ToOwned, string::String};

use crate::{
    parser::{ContextParse, LineParseContext, TryFromStr, ZoneInfoParseError},
    rule::epoch_days_for_rule_date,
    utils, ZoneInfoError,
};

// ==== Keyword matching ====

/// Matches `s` against a keyword table the way zic does: case insensitive, with
/// any unambiguous prefix of a keyword accepted (`Ja`, `Su`, `ma`, ...).
pub(crate) fn match_keyword<T: Copy>(
    s: &str,
    table: &[(&'static str, T)],
    ctx: &LineParseContext,
) -> Result<T, ZoneInfoParseError> {
    if s.is_empty() {
        return Err(ZoneInfoParseError::unknown(s, ctx));
    }
    let mut found = None;
    for (keyword, value) in table {
        if keyword.eq_ignore_ascii_case(s) {
            return Ok(*value);
        }
        let is_prefix = keyword
            .get(..s.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(s));
        if is_prefix {
            if found.is_some() {
                // Ambiguous abbreviation, i.e. `Ju` or `S`
                return Err(ZoneInfoParseError::unknown(s, ctx));
            }
            found = Some(*value);
        }
    }
    found.ok_or_else(|| ZoneInfoParseError::unknown(s, ctx))
}

// ==== Zone Table specific types ====

/// The RULES column of a zone line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RuleIdentifier {
    /// `-`: standard time always applies.
    None,
    /// A fixed amount of saved time, i.e. `1:00`.
    Numeric(Time),
    /// The name of a rule set.
    Named(String),
}

impl TryFromStr<LineParseContext> for RuleIdentifier {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("RuleIdentifier");
        let result = if s == "-" {
            Ok(Self::None)
        } else if starts_like_time(s) {
            Time::try_from_str(s, ctx).map(Self::Numeric)
        } else {
            Ok(Self::Named(s.to_owned()))
        };
        ctx.exit();
        result
    }
}

fn starts_like_time(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

/// The FORMAT column of a zone line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AbbreviationFormat {
    /// Used verbatim, i.e. `LMT`.
    Literal(String),
    /// A template where `%s` is replaced by the rule letter, i.e. `E%sT`.
    Letter(String),
    /// A template where `%z` is replaced by the numeric UT offset.
    Offset(String),
    /// A `STD/DST` pair.
    Pair(String, String),
}

impl AbbreviationFormat {
    /// Classifies a raw FORMAT column. Templates are only validated when formatted.
    pub fn from_source(s: &str) -> Self {
        // A leading '/' is not a pair separator.
        if let Some((std, dst)) = s.split_once('/').filter(|(std, _)| !std.is_empty()) {
            Self::Pair(std.to_owned(), dst.to_owned())
        } else if s.contains("%s") {
            Self::Letter(s.to_owned())
        } else if s.contains("%z") {
            Self::Offset(s.to_owned())
        } else {
            Self::Literal(s.to_owned())
        }
    }

    /// Returns the raw format as it appears in the source.
    pub fn as_source(&self) -> String {
        match self {
            Self::Literal(s) | Self::Letter(s) | Self::Offset(s) => s.clone(),
            Self::Pair(std, dst) => {
                let mut output = std.clone();
                output.push('/');
                output.push_str(dst);
                output
            }
        }
    }

    /// Formats the abbreviation for a standard offset, the savings in effect and
    /// the rule letter in effect.
    pub fn format(
        &self,
        std_offset: i64,
        savings: i64,
        letter: Option<&str>,
    ) -> Result<String, ZoneInfoError> {
        let formatted = match self {
            Self::Literal(s) => {
                check_escapes(s, None)?;
                s.clone()
            }
            Self::Letter(s) => {
                check_escapes(s, Some('s'))?;
                s.replace("%s", letter.unwrap_or(""))
            }
            Self::Offset(s) => {
                check_escapes(s, Some('z'))?;
                s.replace("%z", &offset_to_str(std_offset + savings))
            }
            Self::Pair(std, dst) => {
                if std.is_empty() || dst.is_empty() {
                    return Err(ZoneInfoError::InvalidNameFormat(self.as_source()));
                }
                if savings == 0 {
                    std.clone()
                } else {
                    dst.clone()
                }
            }
        };
        if formatted.is_empty() && !matches!(self, Self::Letter(_)) {
            return Err(ZoneInfoError::InvalidNameFormat(self.as_source()));
        }
        Ok(formatted)
    }
}

// Only the escape of the template's own kind may appear.
fn check_escapes(s: &str, allowed: Option<char>) -> Result<(), ZoneInfoError> {
    if s.is_empty() {
        return Err(ZoneInfoError::InvalidNameFormat(s.to_owned()));
    }
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' && chars.next() != allowed {
            return Err(ZoneInfoError::InvalidNameFormat(s.to_owned()));
        }
    }
    Ok(())
}

/// Formats a UT offset the way `%z` does: `+hh`, `+hhmm` or `+hhmmss`.
pub(crate) fn offset_to_str(n: i64) -> String {
    let mut output = String::new();
    if n < 0 {
        output.push('-');
    } else {
        output.push('+');
    }
    let hour = n.abs().div_euclid(3600);
    let minute = n.abs().rem_euclid(3600).div_euclid(60);
    let second = n.abs().rem_euclid(60);
    let _ = write!(&mut output, "{hour:02}");
    if minute > 0 || second > 0 {
        let _ = write!(&mut output, "{minute:02}");
    }
    if second > 0 {
        let _ = write!(&mut output, "{second:02}");
    }
    output
}

impl TryFromStr<LineParseContext> for AbbreviationFormat {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("Abbr. Format");
        let value = Self::from_source(s);
        ctx.exit();
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UntilDateTime {
    pub date: Date,
    pub time: QualifiedTime,
}

impl UntilDateTime {
    pub fn as_date_secs(self) -> i64 {
        self.date.as_secs()
    }

    /// Returns the UNTIL instant for the zone line's standard offset and the
    /// savings in effect at the boundary.
    pub fn as_precise_ut_time(self, std_offset: i64, save: i64) -> i64 {
        self.as_date_secs() + self.time.to_universal_seconds(std_offset, save)
    }

    /// Parses the (up to) four UNTIL columns.
    pub(crate) fn from_columns(
        columns: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        ctx.enter("UntilDateTime");
        let year = match columns.first() {
            Some(year) => year.context_parse::<i32>(ctx)?,
            None => return Err(ZoneInfoParseError::unexpected_eol(ctx)),
        };
        let month = columns
            .get(1)
            .map(|m| m.context_parse::<Month>(ctx))
            .transpose()?
            .unwrap_or(Month::Jan);
        let day = match columns.get(2) {
            Some(day) => day
                .context_parse::<DayOfMonth>(ctx)?
                .check_month(month, ctx)?,
            None => DayOfMonth::Day(1),
        };
        let time = columns
            .get(3)
            .map(|t| t.context_parse::<QualifiedTime>(ctx))
            .transpose()?
            .unwrap_or(QualifiedTime::Local(Time::default()));
        if let Some(extra) = columns.get(4) {
            return Err(ZoneInfoParseError::UnexpectedToken(
                ctx.line_number,
                ctx.span(),
                (*extra).to_owned(),
            ));
        }
        ctx.exit();
        Ok(Self {
            date: Date { year, month, day },
            time,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Date {
    pub year: i32,
    pub month: Month,
    pub day: DayOfMonth,
}

impl Date {
    pub fn as_secs(&self) -> i64 {
        let epoch_days = epoch_days_for_rule_date(self.year, self.month, self.day);
        utils::epoch_seconds_for_epoch_days(epoch_days)
    }
}

// ==== Time ====

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Time {
    pub sign: Sign,
    pub hour: u16,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(i8)]
pub enum Sign {
    #[default]
    Positive = 1,
    Negative = -1,
}

impl Time {
    pub const fn as_secs(&self) -> i64 {
        (self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64) * self.sign as i64
    }

    /// Creates a `Time` from signed seconds.
    ///
    /// Hours saturate at `u16::MAX`.
    pub const fn from_secs(secs: i64) -> Self {
        let sign = if secs < 0 {
            Sign::Negative
        } else {
            Sign::Positive
        };
        let abs = secs.unsigned_abs();
        let hours = abs / 3600;
        Self {
            sign,
            hour: if hours > u16::MAX as u64 {
                u16::MAX
            } else {
                hours as u16
            },
            minute: ((abs % 3600) / 60) as u8,
            second: (abs % 60) as u8,
        }
    }
}

impl TryFromStr<LineParseContext> for Time {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("Time");
        let (unsigned, sign) = if let Some(stripped) = s.strip_prefix('-') {
            (stripped, Sign::Negative)
        } else {
            (s, Sign::Positive)
        };
        let mut parts = unsigned.splitn(3, ':');
        let hour = parts.next().unwrap_or_default().context_parse::<u16>(ctx)?;
        let minute = parts
            .next()
            .map(|m| m.context_parse::<u8>(ctx))
            .transpose()?
            .unwrap_or(0);
        let second = parts
            .next()
            .map(|sec| sec.context_parse::<u8>(ctx))
            .transpose()?
            .unwrap_or(0);
        if minute > 59 || second > 59 {
            return Err(ZoneInfoParseError::unknown(s, ctx));
        }
        ctx.exit();
        Ok(Self {
            sign,
            hour,
            minute,
            second,
        })
    }
}

// ==== Rule types ====

/// A FROM or TO year of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RuleYear {
    /// `min`: the indefinite past.
    Min,
    Year(i32),
    /// `max`: the indefinite future.
    Max,
}

impl RuleYear {
    /// Parses a TO year, where `only` repeats the FROM year.
    pub(crate) fn parse_to_year(
        s: &str,
        from: RuleYear,
        ctx: &mut LineParseContext,
    ) -> Result<RuleYear, ZoneInfoParseError> {
        let starts_alphabetic = s.starts_with(|c: char| c.is_ascii_alphabetic());
        if starts_alphabetic
            && match_keyword(s, &[("only", ()), ("minimum", ()), ("maximum", ())], ctx).is_ok()
            && match_keyword(s, &[("only", ())], ctx).is_ok()
        {
            return Ok(from);
        }
        s.context_parse::<RuleYear>(ctx)
    }

    pub fn to_i32(self) -> i32 {
        match self {
            Self::Min => i32::MIN,
            Self::Year(y) => y,
            Self::Max => i32::MAX,
        }
    }
}

impl TryFromStr<LineParseContext> for RuleYear {
    type Error = ZoneInfoParseError;

    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("Year");
        let result = if s.starts_with(|c: char| c.is_ascii_alphabetic()) {
            match_keyword(s, &[("minimum", Self::Min), ("maximum", Self::Max)], ctx)
        } else {
            s.context_parse::<i32>(ctx).map(Self::Year)
        };
        ctx.exit();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Month {
    Jan = 1,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    const KEYWORDS: [(&'static str, Month); 12] = [
        ("January", Self::Jan),
        ("February", Self::Feb),
        ("March", Self::Mar),
        ("April", Self::Apr),
        ("May", Self::May),
        ("June", Self::Jun),
        ("July", Self::Jul),
        ("August", Self::Aug),
        ("September", Self::Sep),
        ("October", Self::Oct),
        ("November", Self::Nov),
        ("December", Self::Dec),
    ];

    /// The length of the month in a leap year.
    pub fn max_days(self) -> u8 {
        match self {
            Self::Feb => 29,
            Self::Apr | Self::Jun | Self::Sep | Self::Nov => 30,
            _ => 31,
        }
    }

    pub fn from_number(month: u8) -> Option<Self> {
        Self::KEYWORDS
            .get(usize::from(month).checked_sub(1)?)
            .map(|(_, m)| *m)
    }

    pub(crate) fn month_start_to_day_of_year(self, year: i32) -> i32 {
        utils::month_to_day(self as u8, utils::in_leap_year(year))
    }

    pub(crate) fn month_end_to_day_of_year(self, year: i32) -> i32 {
        utils::month_to_day(self as u8 + 1, utils::in_leap_year(year)) - 1
    }
}

impl TryFromStr<LineParseContext> for Month {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("Month");
        let result = match_keyword(s, &Self::KEYWORDS, ctx);
        ctx.exit();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DayOfMonth {
    /// `lastSun`
    Last(WeekDay),
    /// `Sun>=8`
    WeekDayGEThanMonthDay(WeekDay, u8),
    /// `Sun<=25`
    WeekDayLEThanMonthDay(WeekDay, u8),
    Day(u8),
}

impl TryFromStr<LineParseContext> for DayOfMonth {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("DayOfMonth");
        let last = s
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("last"))
            .and_then(|_| s.get(4..));
        let result = if let Some(weekday) = last {
            weekday.context_parse(ctx).map(DayOfMonth::Last)
        } else if s.contains(">=") {
            parse_date_split(s, ">=", ctx).map(|(w, d)| DayOfMonth::WeekDayGEThanMonthDay(w, d))
        } else if s.contains("<=") {
            parse_date_split(s, "<=", ctx).map(|(w, d)| DayOfMonth::WeekDayLEThanMonthDay(w, d))
        } else {
            s.context_parse::<u8>(ctx)
                .and_then(|day| check_day(day, s, ctx))
                .map(DayOfMonth::Day)
        };
        ctx.exit();
        result
    }
}

impl DayOfMonth {
    /// Rejects a day that is past the end of `month`.
    pub(crate) fn check_month(
        self,
        month: Month,
        ctx: &LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        let day = match self {
            Self::Last(_) => return Ok(self),
            Self::WeekDayGEThanMonthDay(_, day)
            | Self::WeekDayLEThanMonthDay(_, day)
            | Self::Day(day) => day,
        };
        if day <= month.max_days() {
            return Ok(self);
        }
        Err(ZoneInfoParseError::UnknownValue(
            ctx.line_number,
            ctx.span(),
            alloc::format!("{month:?} {day}"),
        ))
    }
}

fn check_day(day: u8, s: &str, ctx: &LineParseContext) -> Result<u8, ZoneInfoParseError> {
    if (1..=31).contains(&day) {
        Ok(day)
    } else {
        Err(ZoneInfoParseError::unknown(s, ctx))
    }
}

fn parse_date_split(
    s: &str,
    pat: &str,
    ctx: &mut LineParseContext,
) -> Result<(WeekDay, u8), ZoneInfoParseError> {
    let (week_day, num) = s
        .split_once(pat)
        .ok_or_else(|| ZoneInfoParseError::unknown(s, ctx))?;
    let w = week_day.context_parse::<WeekDay>(ctx)?;
    let d = num.context_parse::<u8>(ctx)?;
    Ok((w, check_day(d, s, ctx)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum WeekDay {
    Sun = 0,
    Mon,
    Tues,
    Wed,
    Thurs,
    Fri,
    Sat,
}

impl WeekDay {
    const KEYWORDS: [(&'static str, WeekDay); 7] = [
        ("Sunday", Self::Sun),
        ("Monday", Self::Mon),
        ("Tuesday", Self::Tues),
        ("Wednesday", Self::Wed),
        ("Thursday", Self::Thurs),
        ("Friday", Self::Fri),
        ("Saturday", Self::Sat),
    ];

    pub fn from_number(day: u8) -> Option<Self> {
        Self::KEYWORDS.get(usize::from(day)).map(|(_, d)| *d)
    }
}

impl TryFromStr<LineParseContext> for WeekDay {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("WeekDay");
        let result = match_keyword(s, &Self::KEYWORDS, ctx);
        ctx.exit();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum QualifiedTimeKind {
    Local,
    Standard,
    Universal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum QualifiedTime {
    /// Wall clock time, including any saved time.
    Local(Time),
    /// Local standard time.
    Standard(Time),
    Universal(Time),
}

impl QualifiedTime {
    /// Returns the universal seconds of this time of day.
    pub fn to_universal_seconds(&self, std_offset: i64, save: i64) -> i64 {
        match self {
            Self::Local(t) => t.as_secs() - std_offset - save,
            Self::Standard(t) => t.as_secs() - std_offset,
            Self::Universal(t) => t.as_secs(),
        }
    }

    pub fn time(&self) -> Time {
        match self {
            Self::Local(t) | Self::Standard(t) | Self::Universal(t) => *t,
        }
    }

    pub fn time_kind(&self) -> QualifiedTimeKind {
        match self {
            Self::Local(_) => QualifiedTimeKind::Local,
            Self::Standard(_) => QualifiedTimeKind::Standard,
            Self::Universal(_) => QualifiedTimeKind::Universal,
        }
    }

    pub fn from_kind(kind: QualifiedTimeKind, time: Time) -> Self {
        match kind {
            QualifiedTimeKind::Local => Self::Local(time),
            QualifiedTimeKind::Standard => Self::Standard(time),
            QualifiedTimeKind::Universal => Self::Universal(time),
        }
    }
}

impl TryFromStr<LineParseContext> for QualifiedTime {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        let (time, kind) = match s.as_bytes().last() {
            Some(b's') => (&s[..s.len() - 1], QualifiedTimeKind::Standard),
            Some(b'u' | b'g' | b'z') => (&s[..s.len() - 1], QualifiedTimeKind::Universal),
            Some(b'w') => (&s[..s.len() - 1], QualifiedTimeKind::Local),
            _ => (s, QualifiedTimeKind::Local),
        };
        let time = time.context_parse::<Time>(ctx)?;
        Ok(Self::from_kind(kind, time))
    }
}
