//! Data providers for compiled time zone data
//!
//! This crate reads and writes the binary artifact produced by the zoneinfo
//! compiler, and answers offset lookups against it through the
//! [`TimeZoneProvider`](provider::TimeZoneProvider) trait.
//!
//! ```
//! use std::sync::Arc;
//!
//! use timezone_provider::{
//!     binary::BinaryZoneWriter,
//!     provider::{TimeZoneProvider, ZoneDataProvider},
//! };
//! use zoneinfo_rs::{compiler::ZoneInfoCompiler, ZoneInfoData};
//!
//! let data = ZoneInfoData::from_zoneinfo_file("Z Europe/Moscow 3 - MSK\n");
//! let moscow = ZoneInfoCompiler::new(&data)
//!     .compile_zone("Europe/Moscow")
//!     .unwrap()
//!     .unwrap();
//!
//! let mut writer = BinaryZoneWriter::new();
//! writer.add_zone("Europe/Moscow", &Arc::new(moscow));
//! let provider = ZoneDataProvider::try_from_bytes(&writer.finish()).unwrap();
//!
//! let info = provider.offset_for_instant("europe/moscow", 0).unwrap();
//! assert_eq!(info.offset.0, 10_800);
//! assert_eq!(info.abbreviation, "MSK");
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::string::String;
use core::fmt;

use zoneinfo_rs::ZoneInfoError;

pub mod binary;
pub mod provider;

pub use binary::DataError;

/// The error type for provider lookups.
#[derive(Debug)]
pub enum TimeZoneProviderError {
    UnknownIdentifier(String),
    /// The instant or local time can not be resolved by the zone.
    OutOfRange(&'static str),
    /// A gap or overlap under `Disambiguation::Reject`.
    Rejected(&'static str),
    Data(DataError),
    ZoneInfo(ZoneInfoError),
    #[cfg(feature = "std")]
    Io(std::io::Error),
}

impl fmt::Display for TimeZoneProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIdentifier(id) => write!(f, "unknown time zone identifier: {id}"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Data(err) => write!(f, "invalid zone data: {err}"),
            Self::ZoneInfo(err) => write!(f, "{err}"),
            #[cfg(feature = "std")]
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for TimeZoneProviderError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Data(err) => Some(err),
            Self::ZoneInfo(err) => Some(err),
            #[cfg(feature = "std")]
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DataError> for TimeZoneProviderError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

impl From<ZoneInfoError> for TimeZoneProviderError {
    fn from(value: ZoneInfoError) -> Self {
        Self::ZoneInfo(value)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for TimeZoneProviderError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
