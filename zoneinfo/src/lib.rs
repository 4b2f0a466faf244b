//! A library for parsing and compiling zoneinfo files into ordered offset
//! intervals that can be looked up at runtime or serialized into any other
//! desired time zone format.
//!
//! Compilation happens in two steps. First, the source text is parsed into
//! [`ZoneInfoData`], which keeps every rule set, zone record and link along
//! with the lines that could not be parsed. Second, the
//! [`ZoneInfoCompiler`](compiler::ZoneInfoCompiler) resolves each zone into a
//! [`CompiledZone`](compiled::CompiledZone): a contiguous sequence of
//! [`ZoneInterval`](compiled::ZoneInterval)s starting at
//! [`BEGINNING_OF_TIME`], optionally followed by a [`TailRule`](compiled::TailRule)
//! that extrapolates daylight saving time forever.
//!
//! ```
//! use zoneinfo_rs::{compiler::ZoneInfoCompiler, ZoneInfoData};
//!
//! let source = "R US 2007 ma - Mar Su>=8 2 1 D
//! R US 2007 ma - N Su>=1 2 0 S
//! Z America/New_York -5 US E%sT
//! ";
//! let data = ZoneInfoData::from_zoneinfo_file(source);
//! assert!(data.errors.is_empty());
//!
//! let zone = ZoneInfoCompiler::new(&data)
//!     .compile_zone("America/New_York")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(zone.posix_string().as_deref(), Some("EST5EDT,M3.2.0,M11.1.0"));
//! ```

// Implementation note: this library is NOT designed to be the most
// optimal speed. Instead invariance and clarity is preferred where
// need be.
//
// We can get away with any performance penalty primarily because
// this library is designed to aid with build time libraries, on
// a limited dataset, NOT at runtime on extremely large datasets.

#![no_std]

extern crate alloc;

use alloc::string::String;
use core::fmt;

use indexmap::{map::Entry, IndexMap};
use parser::{ZoneInfoParseError, ZoneInfoParser};
use rule::RuleSetTable;
use zone::ZoneRecord;

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
use std::{io, path::Path};

pub mod utils;

pub mod compiled;
pub mod compiler;
pub mod link;
pub mod parser;
pub mod posix;
pub mod rule;
pub mod types;
pub mod zone;

pub use link::Link;

/// The earliest representable instant, the start of every compiled zone.
pub const BEGINNING_OF_TIME: i64 = i64::MIN;

/// The latest representable instant, the end of an open interval.
pub const END_OF_TIME: i64 = i64::MAX;

/// Well-known zone info file
pub const ZONEINFO_FILES: [&str; 9] = [
    "africa",
    "antarctica",
    "asia",
    "australasia",
    "backward",
    "etcetera",
    "europe",
    "northamerica",
    "southamerica",
];

/// The general error type for `ZoneInfo` operations
#[derive(Debug)]
pub enum ZoneInfoError {
    /// A source line that could not be parsed.
    MalformedRecord(ZoneInfoParseError),
    /// Two recurrences of a rule set transition at the same instant.
    MalformedRuleSet { rule_set: String, instant: i64 },
    /// A zone that can not be compiled into contiguous intervals.
    MalformedZone { zone: String, reason: String },
    /// A link whose target does not resolve to a compiled zone.
    UnknownZoneReference { alias: String, target: String },
    /// A FORMAT column that can not produce an abbreviation.
    InvalidNameFormat(String),
    /// A recurrence search exceeded its iteration limit.
    RecurrenceDidNotTerminate { rule_set: String, year: i32 },
    #[cfg(feature = "std")]
    Io(io::Error),
}

impl fmt::Display for ZoneInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRecord(err) => write!(f, "malformed record: {err}"),
            Self::MalformedRuleSet { rule_set, instant } => write!(
                f,
                "rule set {rule_set} has simultaneous transitions at {instant}"
            ),
            Self::MalformedZone { zone, reason } => write!(f, "malformed zone {zone}: {reason}"),
            Self::UnknownZoneReference { alias, target } => {
                write!(f, "link {alias} references unknown zone {target}")
            }
            Self::InvalidNameFormat(format) => write!(f, "invalid name format: {format}"),
            Self::RecurrenceDidNotTerminate { rule_set, year } => write!(
                f,
                "rule set {rule_set} did not produce a transition near {year}"
            ),
            #[cfg(feature = "std")]
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for ZoneInfoError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::MalformedRecord(err) => Some(err),
            #[cfg(feature = "std")]
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ZoneInfoParseError> for ZoneInfoError {
    fn from(value: ZoneInfoParseError) -> Self {
        Self::MalformedRecord(value)
    }
}

#[cfg(feature = "std")]
impl From<io::Error> for ZoneInfoError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// The parsed contents of one or more zoneinfo sources.
///
/// Records are kept in source order. Lines that failed to parse do not abort
/// parsing, they are collected in `errors`.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct ZoneInfoData {
    pub rules: RuleSetTable,
    pub zones: IndexMap<String, ZoneRecord>,
    pub links: IndexMap<String, Link>,
    pub errors: alloc::vec::Vec<ZoneInfoParseError>,
}

// ==== ZoneInfoData parsing methods ====

impl ZoneInfoData {
    /// Parse data from a path to a directory of zoneinfo files, using well known
    /// zoneinfo file names.
    ///
    /// This is usually pointed to a "tzdata" directory.
    #[cfg(feature = "std")]
    pub fn from_zoneinfo_directory<P: AsRef<Path>>(dir: P) -> Result<Self, ZoneInfoError> {
        let mut zoneinfo = Self::default();
        for filename in ZONEINFO_FILES {
            let file_path = dir.as_ref().join(filename);
            let parsed = Self::from_filepath(file_path)?;
            zoneinfo.extend(parsed);
        }
        Ok(zoneinfo)
    }

    /// Parse data from a filepath to a zoneinfo file.
    #[cfg(feature = "std")]
    pub fn from_filepath<P: AsRef<Path>>(path: P) -> Result<Self, ZoneInfoError> {
        Ok(Self::from_zoneinfo_file(&std::fs::read_to_string(path)?))
    }

    /// Parses data from a zoneinfo file as a string slice.
    pub fn from_zoneinfo_file(src: &str) -> Self {
        ZoneInfoParser::from_zoneinfo_str(src).parse()
    }

    /// Extend the current `ZoneInfoData` with the data of another source.
    ///
    /// Rule lines of the same rule set are merged in order. A zone or link name
    /// that is already defined is reported as a duplicate and dropped.
    pub fn extend(&mut self, other: Self) {
        for (name, rules) in other.rules {
            match self.rules.get_mut(&name) {
                Some(existing) => existing.extend(rules),
                None => {
                    let _ = self.rules.insert(name, rules);
                }
            }
        }
        for (name, record) in other.zones {
            self.insert_zone(name, record);
        }
        for (_, link) in other.links {
            self.insert_link(link);
        }
        self.errors.extend(other.errors);
    }

    /// Inserts a zone record, reporting a duplicate name as an error.
    pub fn insert_zone(&mut self, name: String, record: ZoneRecord) {
        match self.zones.entry(name) {
            Entry::Occupied(entry) => self.errors.push(ZoneInfoParseError::DuplicateIdentifier(
                record.line_number,
                entry.key().clone(),
            )),
            Entry::Vacant(entry) => {
                let _ = entry.insert(record);
            }
        }
    }

    /// Inserts a link, reporting a duplicate alias as an error.
    pub fn insert_link(&mut self, link: Link) {
        match self.links.entry(link.alias.clone()) {
            Entry::Occupied(_) => self.errors.push(ZoneInfoParseError::DuplicateIdentifier(
                link.line_number,
                link.alias,
            )),
            Entry::Vacant(entry) => {
                let _ = entry.insert(link);
            }
        }
    }
}
