//! POSIX TZ strings for the future behaviour of a compiled zone.

use core::fmt::{self, Write};

use alloc::string::{String, ToString};

use crate::{
    compiled::{CompiledZone, TailRule},
    rule::Recurrence,
    types::{DayOfMonth, Month, QualifiedTime, WeekDay},
    utils::month_to_day,
};

// POSIX assumes one hour of savings, at 02:00.
const DEFAULT_SAVINGS: i64 = 3600;
const DEFAULT_TRANSITION_TIME: i64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWeekDay(pub Month, pub u8, pub WeekDay);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosixDate {
    /// `Jn`, a day of a year without February 29th
    JulianNoLeap(u16),
    /// `Mm.w.d`
    MonthWeekDay(MonthWeekDay),
}

impl PosixDate {
    /// Returns `None` for day rules without a POSIX equivalent.
    pub(crate) fn from_recurrence(recurrence: &Recurrence) -> Option<Self> {
        let month = recurrence.month;
        let date = match recurrence.on_date {
            DayOfMonth::Day(29) if month == Month::Feb => return None,
            DayOfMonth::Day(day) => {
                let day_of_year = month_to_day(month as u8, false) + i32::from(day);
                PosixDate::JulianNoLeap(u16::try_from(day_of_year).ok()?)
            }
            DayOfMonth::Last(week_day) => PosixDate::MonthWeekDay(MonthWeekDay(month, 5, week_day)),
            DayOfMonth::WeekDayGEThanMonthDay(week_day, day) if day >= 1 && (day - 1) % 7 == 0 && day <= 22 => {
                PosixDate::MonthWeekDay(MonthWeekDay(month, 1 + (day - 1) / 7, week_day))
            }
            DayOfMonth::WeekDayLEThanMonthDay(week_day, day) if day >= 7 && day % 7 == 0 && day <= 28 => {
                PosixDate::MonthWeekDay(MonthWeekDay(month, day / 7, week_day))
            }
            _ => return None,
        };
        Some(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixDateTime {
    pub date: PosixDate,
    /// Local wall clock seconds of the transition, before it happens
    pub time: i64,
}

impl PosixDateTime {
    pub(crate) fn from_recurrence(
        recurrence: &Recurrence,
        std_offset: i64,
        prior_savings: i64,
    ) -> Option<Self> {
        let date = PosixDate::from_recurrence(recurrence)?;
        let time = match recurrence.at {
            QualifiedTime::Local(time) => time.as_secs(),
            QualifiedTime::Standard(time) => time.as_secs() + prior_savings,
            QualifiedTime::Universal(time) => time.as_secs() + std_offset + prior_savings,
        };
        Some(Self { date, time })
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixTransition {
    pub abbr: PosixAbbreviation,
    pub savings: i64,
    pub start: PosixDateTime,
    pub end: PosixDateTime,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixTimeZone {
    pub abbr: PosixAbbreviation,
    /// The UT offset of standard time
    pub offset: i64,
    pub transition_info: Option<PosixTransition>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixAbbreviation {
    is_numeric: bool,
    formatted: String,
}

impl PosixAbbreviation {
    fn new(formatted: String) -> Self {
        Self {
            is_numeric: !formatted.chars().all(|c| c.is_ascii_alphabetic()),
            formatted,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.formatted
    }
}

impl PosixTimeZone {
    /// Builds the POSIX time zone for a two recurrence tail, one of which must
    /// be without savings.
    pub fn from_tail(tail: &TailRule) -> Option<Self> {
        let [first, second] = tail.rules.recurrences() else {
            return None;
        };
        let (standard, saving) = match (first.savings(), second.savings()) {
            (0, 0) => return None,
            (0, _) => (first, second),
            (_, 0) => (second, first),
            _ => return None,
        };
        let std_offset = tail.std_offset;
        let abbr = tail
            .format
            .format(std_offset, 0, standard.letter.as_deref())
            .ok()?;
        let dst_abbr = tail
            .format
            .format(std_offset, saving.savings(), saving.letter.as_deref())
            .ok()?;
        let start = PosixDateTime::from_recurrence(saving, std_offset, 0)?;
        let end = PosixDateTime::from_recurrence(standard, std_offset, saving.savings())?;
        Some(Self {
            abbr: PosixAbbreviation::new(abbr),
            offset: std_offset,
            transition_info: Some(PosixTransition {
                abbr: PosixAbbreviation::new(dst_abbr),
                savings: saving.savings(),
                start,
                end,
            }),
        })
    }
}

impl CompiledZone {
    /// Returns the POSIX time zone describing the zone after its last
    /// explicit interval, or `None` if POSIX can not express it.
    pub fn posix_time_zone(&self) -> Option<PosixTimeZone> {
        if let Some(tail) = &self.tail {
            return PosixTimeZone::from_tail(tail);
        }
        let last = self.intervals.last().filter(|i| i.is_open_ended())?;
        Some(PosixTimeZone {
            abbr: PosixAbbreviation::new(last.name.clone()),
            offset: last.wall_offset(),
            transition_info: None,
        })
    }

    pub fn posix_string(&self) -> Option<String> {
        self.posix_time_zone().map(|tz| tz.to_string())
    }
}

impl fmt::Display for PosixTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_abbr(&self.abbr, f)?;
        write_inverted_time(self.offset, f)?;

        if let Some(transition_info) = &self.transition_info {
            write_abbr(&transition_info.abbr, f)?;
            if transition_info.savings != DEFAULT_SAVINGS {
                write_inverted_time(self.offset + transition_info.savings, f)?;
            }
            write_date_time(&transition_info.start, f)?;
            write_date_time(&transition_info.end, f)?;
        }
        Ok(())
    }
}

fn write_abbr(posix_abbr: &PosixAbbreviation, output: &mut impl Write) -> fmt::Result {
    if posix_abbr.is_numeric {
        return write!(output, "<{}>", posix_abbr.formatted);
    }
    write!(output, "{}", posix_abbr.formatted)
}

fn write_inverted_time(offset: i64, output: &mut impl Write) -> fmt::Result {
    // Yep, it's inverted
    write_time(-offset, output)
}

fn write_time(secs: i64, output: &mut impl Write) -> fmt::Result {
    if secs < 0 {
        write!(output, "-")?;
    }
    let secs = secs.abs();
    write!(output, "{}", secs / 3600)?;
    let (minute, second) = ((secs % 3600) / 60, secs % 60);
    if minute == 0 && second == 0 {
        return Ok(());
    }
    write!(output, ":{minute:02}")?;
    if second > 0 {
        write!(output, ":{second:02}")?;
    }
    Ok(())
}

fn write_date_time(datetime: &PosixDateTime, output: &mut impl Write) -> fmt::Result {
    write!(output, ",")?;
    match datetime.date {
        PosixDate::JulianNoLeap(d) => write!(output, "J{d}")?,
        PosixDate::MonthWeekDay(MonthWeekDay(month, week, day)) => {
            write!(output, "M{}.{week}.{}", month as u8, day as u8)?
        }
    }
    if datetime.time != DEFAULT_TRANSITION_TIME {
        write!(output, "/")?;
        write_time(datetime.time, output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use crate::{compiler::ZoneInfoCompiler, parser::ZoneInfoParser};

    fn posix_string(source: &str, zone: &str) -> Option<String> {
        let data = ZoneInfoParser::from_zoneinfo_str(source).parse();
        assert!(data.errors.is_empty(), "{:?}", data.errors);
        let compiled = ZoneInfoCompiler::new(&data)
            .compile_zone(zone)
            .unwrap()
            .unwrap();
        compiled.posix_string()
    }

    #[test]
    fn posix_string_test() {
        let new_york = "R US 2007 ma - Mar Su>=8 2 1 D
R US 2007 ma - N Su>=1 2 0 S
Z Test/NY -5 US E%sT
";
        assert_eq!(
            posix_string(new_york, "Test/NY").as_deref(),
            Some("EST5EDT,M3.2.0,M11.1.0")
        );

        let lord_howe = "R LH 2008 ma - Ap Su>=1 2 0 -
R LH 2008 ma - O Su>=1 2 0:30 -
Z Test/LH 10:30 LH %z
";
        assert_eq!(
            posix_string(lord_howe, "Test/LH").as_deref(),
            Some("<+1030>-10:30<+11>-11,M10.1.0,M4.1.0")
        );

        let troll = "R Tr 2005 ma - Mar lastSu 1u 2 +02
R Tr 2004 ma - O lastSu 1u 0 +00
Z Test/Troll 0 Tr %s
";
        assert_eq!(
            posix_string(troll, "Test/Troll").as_deref(),
            Some("<+00>0<+02>-2,M3.5.0/1,M10.5.0/3")
        );

        let dublin = "R IE 1971 ma - O lastSu 1u -1 -
R IE 1972 ma - Mar lastSu 1u 0 -
Z Test/Dublin 1 IE IST/GMT
";
        assert_eq!(
            posix_string(dublin, "Test/Dublin").as_deref(),
            Some("IST-1GMT0,M10.5.0,M3.5.0/1")
        );

        assert_eq!(
            posix_string("Z Test/Minsk 3 - %z\n", "Test/Minsk").as_deref(),
            Some("<+03>-3")
        );
        assert_eq!(
            posix_string("Z Test/Moscow 3 - MSK\n", "Test/Moscow").as_deref(),
            Some("MSK-3")
        );
        assert_eq!(
            posix_string("Z Test/Kolkata 5:30 - IST\n", "Test/Kolkata").as_deref(),
            Some("IST-5:30")
        );
        assert_eq!(posix_string("Z Test/Bounded 0 - A 2000\n", "Test/Bounded"), None);
    }

    #[test]
    fn unaligned_day_rules() {
        let source = "R X 2000 ma - Mar Su>=2 2 1 D
R X 2000 ma - O Su>=1 2 0 S
Z Test/X 0 X X%sT
";
        assert_eq!(posix_string(source, "Test/X"), None);
    }
}
