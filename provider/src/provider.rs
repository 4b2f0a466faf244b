//! The `TimeZoneProvider` trait and the provider over a compiled artifact.

use core::{fmt, str::FromStr};

use alloc::{
    borrow::Cow,
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};

use zerotrie::ZeroAsciiIgnoreCaseTrie;
use zoneinfo_rs::{
    compiled::{CompiledZone, LocalIntervals, ZoneInterval},
    utils::{self, MAX_YEAR, MIN_YEAR, SECONDS_PER_DAY},
    BEGINNING_OF_TIME,
};

use crate::{
    binary::{DataError, ZoneData},
    TimeZoneProviderError,
};

pub(crate) type TimeZoneProviderResult<T> = Result<T, TimeZoneProviderError>;

/// `UtcOffsetSeconds` represents the amount of seconds we need to add to the UTC to reach the local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtcOffsetSeconds(pub i64);

impl fmt::Display for UtcOffsetSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)?;
        if abs % 60 != 0 {
            write!(f, ":{:02}", abs % 60)?;
        }
        Ok(())
    }
}

/// A wall clock date and time, without any offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl IsoDateTime {
    /// Returns the wall clock seconds as if the wall clock were UTC.
    pub fn to_local_seconds(self) -> TimeZoneProviderResult<i64> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(TimeZoneProviderError::OutOfRange("year is outside the supported range"));
        }
        let days = utils::epoch_days_from_gregorian_date(self.year, self.month, self.day);
        Ok(days * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second))
    }

    /// The inverse of [`IsoDateTime::to_local_seconds`].
    pub fn from_local_seconds(seconds: i64) -> Self {
        let (year, month, day) = utils::ymd_from_epoch_days(seconds.div_euclid(SECONDS_PER_DAY));
        let time = seconds.rem_euclid(SECONDS_PER_DAY);
        Self {
            year,
            month,
            day,
            hour: (time / 3600) as u8,
            minute: ((time % 3600) / 60) as u8,
            second: (time % 60) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseIsoDateTimeError;

impl fmt::Display for ParseIsoDateTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a date time in the form YYYY-MM-DDTHH:MM[:SS]")
    }
}

impl core::error::Error for ParseIsoDateTimeError {}

impl FromStr for IsoDateTime {
    type Err = ParseIsoDateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, time) = s
            .split_once(|c: char| matches!(c, 'T' | 't' | ' '))
            .ok_or(ParseIsoDateTimeError)?;
        // A leading sign is allowed on the year.
        let (year, rest) = match date.strip_prefix('-') {
            Some(unsigned) => {
                let (year, rest) = unsigned.split_once('-').ok_or(ParseIsoDateTimeError)?;
                (-year.parse::<i32>().map_err(|_| ParseIsoDateTimeError)?, rest)
            }
            None => {
                let (year, rest) = date.split_once('-').ok_or(ParseIsoDateTimeError)?;
                (year.parse::<i32>().map_err(|_| ParseIsoDateTimeError)?, rest)
            }
        };
        let (month, day) = rest.split_once('-').ok_or(ParseIsoDateTimeError)?;
        let mut time = time.split(':');
        let mut field = |max: u8, required: bool| -> Result<u8, ParseIsoDateTimeError> {
            match time.next() {
                Some(v) => v
                    .parse::<u8>()
                    .ok()
                    .filter(|v| *v <= max)
                    .ok_or(ParseIsoDateTimeError),
                None if required => Err(ParseIsoDateTimeError),
                None => Ok(0),
            }
        };
        let (hour, minute, second) = (field(23, true)?, field(59, true)?, field(59, false)?);
        if time.next().is_some() {
            return Err(ParseIsoDateTimeError);
        }

        let month = month.parse::<u8>().map_err(|_| ParseIsoDateTimeError)?;
        let day = day.parse::<u8>().map_err(|_| ParseIsoDateTimeError)?;
        if !(1..=12).contains(&month) {
            return Err(ParseIsoDateTimeError);
        }
        let leap = utils::in_leap_year(year);
        let days_in_month =
            utils::month_to_day(month + 1, leap) - utils::month_to_day(month, leap);
        if day == 0 || i32::from(day) > days_in_month {
            return Err(ParseIsoDateTimeError);
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }
}

/// An epoch seconds value and the UTC offset it was resolved with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EpochSecondsAndOffset {
    pub epoch: i64,
    pub offset: UtcOffsetSeconds,
}

/// `TimeZoneTransitionInfo` represents the offset in effect at an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZoneTransitionInfo {
    /// The transition time epoch at which the offset started to apply, `None`
    /// from the beginning of time.
    pub transition_epoch: Option<i64>,
    /// The time zone offset in seconds.
    pub offset: UtcOffsetSeconds,
    pub is_dst: bool,
    pub abbreviation: String,
}

impl From<ZoneInterval> for TimeZoneTransitionInfo {
    fn from(interval: ZoneInterval) -> Self {
        Self {
            transition_epoch: (interval.start != BEGINNING_OF_TIME).then_some(interval.start),
            offset: UtcOffsetSeconds(interval.wall_offset()),
            is_dst: interval.is_dst(),
            abbreviation: interval.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDirection {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy)]
pub struct ParseDirectionError;

impl fmt::Display for ParseDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("provided string was not a valid direction.")
    }
}

impl core::error::Error for ParseDirectionError {}

impl FromStr for TransitionDirection {
    type Err = ParseDirectionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "previous" => Ok(Self::Previous),
            _ => Err(ParseDirectionError),
        }
    }
}

impl fmt::Display for TransitionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "next",
            Self::Previous => "previous",
        })
    }
}

/// How a local time in a gap or an overlap resolves to a single instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Disambiguation {
    /// `later` for gaps and `earlier` for overlaps.
    #[default]
    Compatible,
    Earlier,
    Later,
    /// Gaps and overlaps are an error.
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct ParseDisambiguationError;

impl fmt::Display for ParseDisambiguationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("provided string was not a valid disambiguation.")
    }
}

impl core::error::Error for ParseDisambiguationError {}

impl FromStr for Disambiguation {
    type Err = ParseDisambiguationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compatible" => Ok(Self::Compatible),
            "earlier" => Ok(Self::Earlier),
            "later" => Ok(Self::Later),
            "reject" => Ok(Self::Reject),
            _ => Err(ParseDisambiguationError),
        }
    }
}

impl fmt::Display for Disambiguation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compatible => "compatible",
            Self::Earlier => "earlier",
            Self::Later => "later",
            Self::Reject => "reject",
        })
    }
}

/// When a local time is in a gap, it is useful to know the offsets before and after.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GapEntryOffsets {
    pub offset_before: UtcOffsetSeconds,
    pub offset_after: UtcOffsetSeconds,
    pub transition_epoch: i64,
}

/// The potential candidates for a given local datetime
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CandidateEpochSeconds {
    Zero(GapEntryOffsets),
    One(EpochSecondsAndOffset),
    Two([EpochSecondsAndOffset; 2]),
}

impl CandidateEpochSeconds {
    fn from_local_intervals(local: i64, intervals: LocalIntervals) -> Self {
        let candidate = |interval: &ZoneInterval| EpochSecondsAndOffset {
            epoch: local - interval.wall_offset(),
            offset: UtcOffsetSeconds(interval.wall_offset()),
        };
        match intervals {
            LocalIntervals::Zero(gap) => Self::Zero(GapEntryOffsets {
                offset_before: UtcOffsetSeconds(gap.offset_before),
                offset_after: UtcOffsetSeconds(gap.offset_after),
                transition_epoch: gap.transition,
            }),
            LocalIntervals::One(interval) => Self::One(candidate(&interval)),
            LocalIntervals::Two(earlier, later) => {
                Self::Two([candidate(&earlier), candidate(&later)])
            }
        }
    }

    pub fn as_slice(&self) -> &[EpochSecondsAndOffset] {
        match *self {
            Self::Zero(..) => &[],
            Self::One(ref one) => core::slice::from_ref(one),
            Self::Two(ref multiple) => &multiple[..],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(*self, Self::Zero(..))
    }

    pub fn len(&self) -> usize {
        match *self {
            Self::Zero(..) => 0,
            Self::One(..) => 1,
            Self::Two(..) => 2,
        }
    }

    pub fn first(&self) -> Option<EpochSecondsAndOffset> {
        match *self {
            Self::Zero(..) => None,
            Self::One(one) | Self::Two([one, _]) => Some(one),
        }
    }

    pub fn last(&self) -> Option<EpochSecondsAndOffset> {
        match *self {
            Self::Zero(..) => None,
            Self::One(last) | Self::Two([_, last]) => Some(last),
        }
    }
}

/// The `TimeZoneProvider` trait provides methods required for a provider
/// to implement in order to source time zone data from that provider.
pub trait TimeZoneProvider {
    /// Returns the identifier as spelled in the data, matched ignoring ASCII case.
    fn normalize_identifier(&self, ident: &'_ [u8]) -> TimeZoneProviderResult<Cow<'_, str>>;

    fn offset_for_instant(
        &self,
        identifier: &str,
        epoch_seconds: i64,
    ) -> TimeZoneProviderResult<TimeZoneTransitionInfo>;

    fn candidates_for_local(
        &self,
        identifier: &str,
        local_datetime: IsoDateTime,
    ) -> TimeZoneProviderResult<CandidateEpochSeconds>;

    fn transition(
        &self,
        identifier: &str,
        epoch_seconds: i64,
        direction: TransitionDirection,
    ) -> TimeZoneProviderResult<Option<i64>>;

    /// Resolves a local time to a single instant.
    fn resolve_local(
        &self,
        identifier: &str,
        local_datetime: IsoDateTime,
        disambiguation: Disambiguation,
    ) -> TimeZoneProviderResult<EpochSecondsAndOffset> {
        let candidates = self.candidates_for_local(identifier, local_datetime)?;
        match (candidates, disambiguation) {
            (CandidateEpochSeconds::One(one), _) => Ok(one),
            (CandidateEpochSeconds::Two(_), Disambiguation::Reject) => Err(
                TimeZoneProviderError::Rejected("local time is ambiguous"),
            ),
            (CandidateEpochSeconds::Two([earlier, _]), Disambiguation::Compatible)
            | (CandidateEpochSeconds::Two([earlier, _]), Disambiguation::Earlier) => Ok(earlier),
            (CandidateEpochSeconds::Two([_, later]), Disambiguation::Later) => Ok(later),
            (CandidateEpochSeconds::Zero(_), Disambiguation::Reject) => Err(
                TimeZoneProviderError::Rejected("local time does not exist"),
            ),
            (CandidateEpochSeconds::Zero(gap), Disambiguation::Earlier) => {
                // The instant the wall clock showed this time before the transition.
                let local = local_datetime.to_local_seconds()?;
                Ok(EpochSecondsAndOffset {
                    epoch: local - gap.offset_after.0,
                    offset: gap.offset_before,
                })
            }
            (CandidateEpochSeconds::Zero(gap), _) => {
                let local = local_datetime.to_local_seconds()?;
                Ok(EpochSecondsAndOffset {
                    epoch: local - gap.offset_before.0,
                    offset: gap.offset_after,
                })
            }
        }
    }
}

/// A provider over the zones of a decoded artifact.
#[derive(Debug)]
pub struct ZoneDataProvider {
    data: ZoneData,
    identifiers: Vec<String>,
    index: ZeroAsciiIgnoreCaseTrie<Vec<u8>>,
}

impl ZoneDataProvider {
    pub fn try_from_bytes(bytes: &[u8]) -> TimeZoneProviderResult<Self> {
        Self::try_from_zone_data(ZoneData::from_bytes(bytes)?)
    }

    pub fn try_from_zone_data(data: ZoneData) -> TimeZoneProviderResult<Self> {
        let identifiers = data.identifiers().map(ToString::to_string).collect::<Vec<_>>();
        let lowercase = identifiers
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.to_ascii_lowercase().into_bytes(), idx))
            .collect::<BTreeMap<Vec<u8>, usize>>();
        let index = ZeroAsciiIgnoreCaseTrie::try_from(&lowercase)
            .map_err(DataError::IdentifierIndex)?;
        log::debug!("Indexed {} time zone identifiers", identifiers.len());
        Ok(Self {
            data,
            identifiers,
            index,
        })
    }

    /// Reads an artifact from a file.
    #[cfg(feature = "std")]
    pub fn try_from_path<P: AsRef<std::path::Path>>(path: P) -> TimeZoneProviderResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::try_from_bytes(&bytes)
    }

    /// The identifiers of every zone and alias, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }

    /// Returns the compiled zone for an identifier, matched ignoring ASCII case.
    pub fn zone(&self, identifier: &str) -> TimeZoneProviderResult<&Arc<CompiledZone>> {
        let normalized = self.normalize_identifier(identifier.as_bytes())?;
        self.data
            .get(normalized.as_ref())
            .ok_or_else(|| TimeZoneProviderError::UnknownIdentifier(identifier.to_string()))
    }
}

impl TimeZoneProvider for ZoneDataProvider {
    fn normalize_identifier(&self, ident: &'_ [u8]) -> TimeZoneProviderResult<Cow<'_, str>> {
        self.index
            .get(ident)
            .and_then(|idx| self.identifiers.get(idx))
            .map(|id| Cow::Borrowed(id.as_str()))
            .ok_or_else(|| {
                TimeZoneProviderError::UnknownIdentifier(String::from_utf8_lossy(ident).into_owned())
            })
    }

    fn offset_for_instant(
        &self,
        identifier: &str,
        epoch_seconds: i64,
    ) -> TimeZoneProviderResult<TimeZoneTransitionInfo> {
        self.zone(identifier)?
            .interval_for_instant(epoch_seconds)?
            .map(TimeZoneTransitionInfo::from)
            .ok_or(TimeZoneProviderError::OutOfRange(
                "instant is beyond the zone's coverage",
            ))
    }

    fn candidates_for_local(
        &self,
        identifier: &str,
        local_datetime: IsoDateTime,
    ) -> TimeZoneProviderResult<CandidateEpochSeconds> {
        let local = local_datetime.to_local_seconds()?;
        let intervals = self
            .zone(identifier)?
            .intervals_for_local(local)?
            .ok_or(TimeZoneProviderError::OutOfRange(
                "local time is beyond the zone's coverage",
            ))?;
        Ok(CandidateEpochSeconds::from_local_intervals(local, intervals))
    }

    fn transition(
        &self,
        identifier: &str,
        epoch_seconds: i64,
        direction: TransitionDirection,
    ) -> TimeZoneProviderResult<Option<i64>> {
        let zone = self.zone(identifier)?;
        let transition = match direction {
            TransitionDirection::Next => zone.next_transition(epoch_seconds)?,
            TransitionDirection::Previous => zone.previous_transition(epoch_seconds)?,
        };
        Ok(transition)
    }
}
