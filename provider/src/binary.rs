//! The binary artifact holding compiled zones.
//!
//! ```txt
//! magic      "TZDC"
//! version    u8
//! strings    count, (byte length, UTF-8 bytes)*
//! directory  count, (id string index, blob offset)*, sorted by id
//! blobs      byte length, zone blobs
//! ```
//!
//! Every integer is a LEB128 varint, signed values are zigzag encoded. A zone
//! blob holds the interval starts as deltas, then the offsets and names of each
//! interval, the end of the last interval and an optional tail rule. Aliases
//! point at the blob of their target.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::fmt;

use zoneinfo_rs::{
    compiled::{CompiledZone, TailRule, ZoneInterval},
    rule::{Recurrence, RuleSet},
    types::{AbbreviationFormat, DayOfMonth, Month, QualifiedTime, RuleYear, Time, WeekDay},
    BEGINNING_OF_TIME, END_OF_TIME,
};

/// The magic bytes at the start of every artifact.
pub const MAGIC: &[u8; 4] = b"TZDC";

/// The artifact version written by [`BinaryZoneWriter`].
pub const VERSION: u8 = 1;

/// Errors encountered while decoding an artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    BadMagic,
    UnsupportedVersion(u8),
    /// The input ended early, at the given byte offset.
    UnexpectedEnd(usize),
    VarintOverflow(usize),
    StringIndexOutOfRange(u64),
    InvalidUtf8(usize),
    InvalidTag(&'static str, u64),
    InconsistentIntervals(&'static str),
    IdentifierIndex(zerotrie::ZeroTrieBuildError),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => f.write_str("input is not a compiled zone artifact"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported artifact version {v}"),
            Self::UnexpectedEnd(at) => write!(f, "artifact truncated at byte {at}"),
            Self::VarintOverflow(at) => write!(f, "varint overflow at byte {at}"),
            Self::StringIndexOutOfRange(idx) => write!(f, "string index {idx} out of range"),
            Self::InvalidUtf8(at) => write!(f, "invalid UTF-8 in string at byte {at}"),
            Self::InvalidTag(field, tag) => write!(f, "invalid {field} tag {tag}"),
            Self::InconsistentIntervals(reason) => write!(f, "inconsistent intervals: {reason}"),
            Self::IdentifierIndex(err) => write!(f, "could not index identifiers: {err}"),
        }
    }
}

impl core::error::Error for DataError {}

// ==== Writer ====

/// Serializes compiled zones into an artifact.
#[derive(Debug, Default)]
pub struct BinaryZoneWriter {
    strings: Vec<String>,
    string_indices: BTreeMap<String, u64>,
    blobs: Vec<u8>,
    // The zones already encoded, with their blob offsets.
    encoded: Vec<(Arc<CompiledZone>, u64)>,
    directory: BTreeMap<String, u64>,
}

impl BinaryZoneWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone under `identifier`. A zone that shares its `Arc` with an
    /// already added zone is stored once.
    pub fn add_zone(&mut self, identifier: &str, zone: &Arc<CompiledZone>) {
        let offset = match self.encoded.iter().find(|(z, _)| Arc::ptr_eq(z, zone)) {
            Some((_, offset)) => *offset,
            None => {
                let offset = self.blobs.len() as u64;
                let mut blob = Vec::new();
                self.encode_zone(zone, &mut blob);
                self.blobs.extend_from_slice(&blob);
                self.encoded.push((zone.clone(), offset));
                offset
            }
        };
        let _ = self.directory.insert(identifier.to_string(), offset);
    }

    /// Writes the complete artifact.
    pub fn finish(mut self) -> Vec<u8> {
        let directory = core::mem::take(&mut self.directory)
            .into_iter()
            .map(|(id, offset)| (self.intern(&id), offset))
            .collect::<Vec<_>>();

        let mut output = Vec::with_capacity(self.blobs.len() + 1024);
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        write_varint(&mut output, self.strings.len() as u64);
        for s in &self.strings {
            write_varint(&mut output, s.len() as u64);
            output.extend_from_slice(s.as_bytes());
        }
        write_varint(&mut output, directory.len() as u64);
        for (id, offset) in directory {
            write_varint(&mut output, id);
            write_varint(&mut output, offset);
        }
        write_varint(&mut output, self.blobs.len() as u64);
        output.extend_from_slice(&self.blobs);
        log::debug!(
            "Wrote {} identifiers, {} distinct zones, {} bytes",
            self.string_indices.len(),
            self.encoded.len(),
            output.len()
        );
        output
    }

    fn intern(&mut self, s: &str) -> u64 {
        if let Some(idx) = self.string_indices.get(s) {
            return *idx;
        }
        let idx = self.strings.len() as u64;
        self.strings.push(s.to_string());
        let _ = self.string_indices.insert(s.to_string(), idx);
        idx
    }

    fn encode_zone(&mut self, zone: &CompiledZone, out: &mut Vec<u8>) {
        write_varint(out, zone.intervals.len() as u64);
        // The first start is always BEGINNING_OF_TIME and is implied.
        let mut previous = 0;
        for interval in zone.intervals.iter().skip(1) {
            write_signed(out, interval.start.wrapping_sub(previous));
            previous = interval.start;
        }
        for interval in &zone.intervals {
            write_signed(out, interval.wall_offset());
            write_signed(out, interval.savings);
            let name = self.intern(&interval.name);
            write_varint(out, name);
        }
        match zone.intervals.last() {
            Some(last) if last.end != END_OF_TIME => {
                out.push(1);
                write_signed(out, last.end.wrapping_sub(previous));
            }
            _ => out.push(0),
        }
        match &zone.tail {
            Some(tail) => {
                out.push(1);
                self.encode_tail(tail, out);
            }
            None => out.push(0),
        }
    }

    fn encode_tail(&mut self, tail: &TailRule, out: &mut Vec<u8>) {
        write_signed(out, tail.std_offset);
        let format = self.intern(&tail.format.as_source());
        write_varint(out, format);
        write_signed(out, tail.initial_savings);
        self.encode_letter(tail.initial_letter.as_deref(), out);
        let recurrences = tail.rules.recurrences();
        write_varint(out, recurrences.len() as u64);
        for recurrence in recurrences {
            let name = self.intern(&recurrence.name);
            write_varint(out, name);
            encode_year(recurrence.from, out);
            encode_year(recurrence.to, out);
            out.push(recurrence.month as u8);
            encode_day_of_month(recurrence.on_date, out);
            let (kind, time) = match recurrence.at {
                QualifiedTime::Local(t) => (0, t),
                QualifiedTime::Standard(t) => (1, t),
                QualifiedTime::Universal(t) => (2, t),
            };
            write_signed(out, time.as_secs());
            out.push(kind);
            write_signed(out, recurrence.save.as_secs());
            self.encode_letter(recurrence.letter.as_deref(), out);
        }
    }

    fn encode_letter(&mut self, letter: Option<&str>, out: &mut Vec<u8>) {
        match letter {
            Some(letter) => {
                let idx = self.intern(letter);
                write_varint(out, idx + 1);
            }
            None => out.push(0),
        }
    }
}

fn encode_year(year: RuleYear, out: &mut Vec<u8>) {
    match year {
        RuleYear::Min => out.push(0),
        RuleYear::Year(y) => {
            out.push(1);
            write_signed(out, i64::from(y));
        }
        RuleYear::Max => out.push(2),
    }
}

fn encode_day_of_month(day: DayOfMonth, out: &mut Vec<u8>) {
    match day {
        DayOfMonth::Day(d) => out.extend_from_slice(&[0, d]),
        DayOfMonth::Last(wd) => out.extend_from_slice(&[1, wd as u8]),
        DayOfMonth::WeekDayGEThanMonthDay(wd, d) => out.extend_from_slice(&[2, wd as u8, d]),
        DayOfMonth::WeekDayLEThanMonthDay(wd, d) => out.extend_from_slice(&[3, wd as u8, d]),
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn write_signed(out: &mut Vec<u8>, value: i64) {
    write_varint(out, ((value << 1) ^ (value >> 63)) as u64);
}

// ==== Reader ====

/// The decoded contents of an artifact.
#[derive(Debug, Clone, Default)]
pub struct ZoneData {
    zones: BTreeMap<String, Arc<CompiledZone>>,
}

impl ZoneData {
    /// Decodes an artifact written by [`BinaryZoneWriter`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DataError> {
        BinaryZoneReader::new(bytes).read()
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<CompiledZone>> {
        self.zones.get(identifier)
    }

    /// The identifiers in the artifact, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn into_zones(self) -> BTreeMap<String, Arc<CompiledZone>> {
        self.zones
    }
}

/// A cursor over artifact bytes.
#[derive(Debug, Clone)]
pub struct BinaryZoneReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BinaryZoneReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn read(mut self) -> Result<ZoneData, DataError> {
        if self.take(MAGIC.len())? != MAGIC {
            return Err(DataError::BadMagic);
        }
        let version = self.byte()?;
        if version != VERSION {
            return Err(DataError::UnsupportedVersion(version));
        }

        let string_count = self.varint()?;
        let mut strings = Vec::new();
        for _ in 0..string_count {
            let len = self.length()?;
            let start = self.position;
            let raw = self.take(len)?;
            let s = core::str::from_utf8(raw).map_err(|_| DataError::InvalidUtf8(start))?;
            strings.push(String::from(s));
        }

        let directory_count = self.varint()?;
        let mut directory = Vec::new();
        for _ in 0..directory_count {
            let id = self.varint()?;
            let offset = self.length()?;
            directory.push((id, offset));
        }

        let blobs_len = self.length()?;
        let blobs = self.take(blobs_len)?;

        let mut decoded = BTreeMap::<usize, Arc<CompiledZone>>::new();
        let mut zones = BTreeMap::new();
        for (id, offset) in directory {
            let id = lookup_string(&strings, id)?;
            let zone = match decoded.get(&offset) {
                Some(zone) => zone.clone(),
                None => {
                    let blob = blobs
                        .get(offset..)
                        .ok_or(DataError::UnexpectedEnd(offset))?;
                    let zone = Arc::new(BlobReader {
                        reader: BinaryZoneReader::new(blob),
                        strings: &strings,
                    }
                    .zone()?);
                    let _ = decoded.insert(offset, zone.clone());
                    zone
                }
            };
            let _ = zones.insert(id.clone(), zone);
        }
        log::debug!(
            "Read {} identifiers with {} distinct zones",
            zones.len(),
            decoded.len()
        );
        Ok(ZoneData { zones })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DataError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DataError::UnexpectedEnd(self.bytes.len()))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, DataError> {
        Ok(self.take(1)?[0])
    }

    fn varint(&mut self) -> Result<u64, DataError> {
        let start = self.position;
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.byte()?;
            let bits = u64::from(byte & 0x7f);
            if shift > 63 || (shift == 63 && bits > 1) {
                return Err(DataError::VarintOverflow(start));
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn signed(&mut self) -> Result<i64, DataError> {
        let value = self.varint()?;
        Ok((value >> 1) as i64 ^ -((value & 1) as i64))
    }

    fn length(&mut self) -> Result<usize, DataError> {
        let start = self.position;
        usize::try_from(self.varint()?).map_err(|_| DataError::VarintOverflow(start))
    }
}

fn lookup_string(strings: &[String], idx: u64) -> Result<&String, DataError> {
    usize::try_from(idx)
        .ok()
        .and_then(|i| strings.get(i))
        .ok_or(DataError::StringIndexOutOfRange(idx))
}

struct BlobReader<'a, 's> {
    reader: BinaryZoneReader<'a>,
    strings: &'s [String],
}

impl BlobReader<'_, '_> {
    fn string(&mut self) -> Result<String, DataError> {
        let idx = self.reader.varint()?;
        lookup_string(self.strings, idx).cloned()
    }

    fn letter(&mut self) -> Result<Option<String>, DataError> {
        match self.reader.varint()? {
            0 => Ok(None),
            idx => lookup_string(self.strings, idx - 1).cloned().map(Some),
        }
    }

    fn zone(mut self) -> Result<CompiledZone, DataError> {
        let count = self.reader.length()?;
        if count == 0 {
            return Err(DataError::InconsistentIntervals("zone without intervals"));
        }
        let mut starts = Vec::new();
        starts.push(BEGINNING_OF_TIME);
        let mut previous = 0i64;
        for _ in 1..count {
            let start = previous.wrapping_add(self.reader.signed()?);
            if starts.last().is_some_and(|last| *last >= start) {
                return Err(DataError::InconsistentIntervals("starts are not increasing"));
            }
            starts.push(start);
            previous = start;
        }

        let mut intervals = Vec::new();
        for (i, start) in starts.iter().enumerate() {
            let wall = self.reader.signed()?;
            let savings = self.reader.signed()?;
            let name = self.string()?;
            let end = starts.get(i + 1).copied().unwrap_or(END_OF_TIME);
            intervals.push(ZoneInterval {
                start: *start,
                end,
                std_offset: wall.wrapping_sub(savings),
                savings,
                name,
            });
        }

        let bounded = match self.reader.byte()? {
            0 => false,
            1 => {
                let end = previous.wrapping_add(self.reader.signed()?);
                if starts.last().is_some_and(|last| *last >= end) {
                    return Err(DataError::InconsistentIntervals("end precedes the last start"));
                }
                if let Some(last) = intervals.last_mut() {
                    last.end = end;
                }
                true
            }
            tag => return Err(DataError::InvalidTag("interval end", u64::from(tag))),
        };

        let tail = match self.reader.byte()? {
            0 => None,
            1 if !bounded => {
                return Err(DataError::InconsistentIntervals("tail after an open interval"))
            }
            1 => {
                let start = intervals.last().map_or(END_OF_TIME, |i| i.end);
                Some(self.tail(start)?)
            }
            tag => return Err(DataError::InvalidTag("tail", u64::from(tag))),
        };
        Ok(CompiledZone { intervals, tail })
    }

    fn tail(&mut self, start: i64) -> Result<TailRule, DataError> {
        let std_offset = self.reader.signed()?;
        let format = AbbreviationFormat::from_source(&self.string()?);
        let initial_savings = self.reader.signed()?;
        let initial_letter = self.letter()?;
        let count = self.reader.length()?;
        let mut recurrences = Vec::new();
        for _ in 0..count {
            recurrences.push(self.recurrence()?);
        }
        let Some(name) = recurrences.first().map(|r| r.name.clone()) else {
            return Err(DataError::InconsistentIntervals("tail without recurrences"));
        };
        Ok(TailRule {
            start,
            std_offset,
            format,
            initial_savings,
            initial_letter,
            rules: RuleSet::from_recurrences(&name, recurrences),
        })
    }

    fn recurrence(&mut self) -> Result<Recurrence, DataError> {
        let name = self.string()?;
        let from = self.year()?;
        let to = self.year()?;
        let month = self.reader.byte()?;
        let month =
            Month::from_number(month).ok_or(DataError::InvalidTag("month", u64::from(month)))?;
        let on_date = self.day_of_month()?;
        let time = Time::from_secs(self.reader.signed()?);
        let at = match self.reader.byte()? {
            0 => QualifiedTime::Local(time),
            1 => QualifiedTime::Standard(time),
            2 => QualifiedTime::Universal(time),
            tag => return Err(DataError::InvalidTag("time mode", u64::from(tag))),
        };
        let save = Time::from_secs(self.reader.signed()?);
        let letter = self.letter()?;
        Ok(Recurrence {
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

    fn year(&mut self) -> Result<RuleYear, DataError> {
        match self.reader.byte()? {
            0 => Ok(RuleYear::Min),
            1 => {
                let year = self.reader.signed()?;
                i32::try_from(year)
                    .map(RuleYear::Year)
                    .map_err(|_| DataError::InvalidTag("year", year as u64))
            }
            2 => Ok(RuleYear::Max),
            tag => Err(DataError::InvalidTag("year", u64::from(tag))),
        }
    }

    fn week_day(&mut self) -> Result<WeekDay, DataError> {
        let day = self.reader.byte()?;
        WeekDay::from_number(day).ok_or(DataError::InvalidTag("week day", u64::from(day)))
    }

    fn day_of_month(&mut self) -> Result<DayOfMonth, DataError> {
        let day = match self.reader.byte()? {
            0 => DayOfMonth::Day(self.reader.byte()?),
            1 => DayOfMonth::Last(self.week_day()?),
            2 => DayOfMonth::WeekDayGEThanMonthDay(self.week_day()?, self.reader.byte()?),
            3 => DayOfMonth::WeekDayLEThanMonthDay(self.week_day()?, self.reader.byte()?),
            tag => return Err(DataError::InvalidTag("day of month", u64::from(tag))),
        };
        Ok(day)
    }
}

#[cfg(test)]
mod tests {
    use alloc::{collections::BTreeMap, string::String, sync::Arc, vec, vec::Vec};

    use zoneinfo_rs::{compiled::CompiledZone, compiler::ZoneInfoCompiler, ZoneInfoData};

    use super::*;

    const SOURCE: &str = "R US 2007 ma - Mar Su>=8 2 1 D
R US 2007 ma - N Su>=1 2 0 S
Z America/New_York -4:56:2 - LMT 1883 N 18 17u
-5 US E%sT
Z Europe/Moscow 3 - MSK
Z Test/Bounded 1 - X 2000
";

    fn zones() -> BTreeMap<String, Arc<CompiledZone>> {
        let data = ZoneInfoData::from_zoneinfo_file(SOURCE);
        let compiled = ZoneInfoCompiler::new(&data).build();
        assert!(compiled.errors.is_empty(), "{:?}", compiled.errors);
        compiled
            .data
            .into_iter()
            .map(|(id, zone)| (id, Arc::new(zone)))
            .collect()
    }

    fn artifact(zones: &BTreeMap<String, Arc<CompiledZone>>) -> Vec<u8> {
        let mut writer = BinaryZoneWriter::new();
        for (id, zone) in zones {
            writer.add_zone(id, zone);
        }
        writer.add_zone("US/Eastern", &zones["America/New_York"]);
        writer.finish()
    }

    #[test]
    fn round_trip() {
        let zones = zones();
        let data = ZoneData::from_bytes(&artifact(&zones)).unwrap();
        assert_eq!(
            data.identifiers().collect::<Vec<_>>(),
            ["America/New_York", "Europe/Moscow", "Test/Bounded", "US/Eastern"]
        );
        for (id, zone) in &zones {
            assert_eq!(data.get(id).unwrap().as_ref(), zone.as_ref(), "{id}");
        }
        assert!(data.get("America/New_York").unwrap().tail.is_some());
        assert_eq!(data.get("Test/Bounded").unwrap().intervals[0].end, 946_681_200);
    }

    #[test]
    fn aliases_share_a_blob() {
        let zones = zones();
        let bytes = artifact(&zones);

        let mut without_alias = BinaryZoneWriter::new();
        for (id, zone) in &zones {
            without_alias.add_zone(id, zone);
        }
        let without_alias = without_alias.finish();
        // Only the identifier and its directory entry are added.
        assert!(bytes.len() - without_alias.len() < 16);

        let data = ZoneData::from_bytes(&bytes).unwrap();
        assert!(Arc::ptr_eq(
            data.get("US/Eastern").unwrap(),
            data.get("America/New_York").unwrap()
        ));
    }

    #[test]
    fn malformed_artifacts() {
        let bytes = artifact(&zones());

        assert_eq!(
            ZoneData::from_bytes(b"TZif2").unwrap_err(),
            DataError::BadMagic
        );

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert_eq!(
            ZoneData::from_bytes(&wrong_version).unwrap_err(),
            DataError::UnsupportedVersion(9)
        );

        for len in [0, 3, 5, 20, bytes.len() - 1] {
            assert!(ZoneData::from_bytes(&bytes[..len]).is_err(), "{len}");
        }

        let mut overflow = vec![b'T', b'Z', b'D', b'C', VERSION];
        overflow.extend_from_slice(&[0xff; 11]);
        assert_eq!(
            ZoneData::from_bytes(&overflow).unwrap_err(),
            DataError::VarintOverflow(5)
        );

        // One string that is not UTF-8.
        let invalid = [b'T', b'Z', b'D', b'C', VERSION, 1, 2, 0xc3, 0x28];
        assert_eq!(
            ZoneData::from_bytes(&invalid).unwrap_err(),
            DataError::InvalidUtf8(7)
        );

        // A directory entry pointing at a missing string.
        let dangling = [b'T', b'Z', b'D', b'C', VERSION, 0, 1, 4, 0, 0];
        assert_eq!(
            ZoneData::from_bytes(&dangling).unwrap_err(),
            DataError::StringIndexOutOfRange(4)
        );
    }

    #[test]
    fn varints() {
        for value in [0, 1, -1, 63, -64, 64, i64::MAX, i64::MIN, 1_205_046_000] {
            let mut out = Vec::new();
            write_signed(&mut out, value);
            let mut reader = BinaryZoneReader::new(&out);
            assert_eq!(reader.signed().unwrap(), value);
            assert_eq!(reader.position, out.len());
        }
        let mut out = Vec::new();
        write_varint(&mut out, 300);
        assert_eq!(out, [0xac, 0x02]);
    }
}
