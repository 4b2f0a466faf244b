//! Implementation of zone info's [`ZoneRecord`]

use core::str::SplitWhitespace;

use alloc::vec::Vec;

use crate::{
    parser::{next_split, ContextParse, LineParseContext, ZoneInfoParseError},
    types::{AbbreviationFormat, RuleIdentifier, Time, UntilDateTime},
    END_OF_TIME,
};

/// `ZoneLine` represents a single row in a `ZoneRecord`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ZoneLine {
    // Standard offset in seconds
    pub std_offset: Time,
    // Source of the saved time
    pub rule: RuleIdentifier,
    pub format: AbbreviationFormat,
    // Exclusive end of the line, open when absent
    pub until: Option<UntilDateTime>,
    pub line_number: u32,
}

impl ZoneLine {
    pub(crate) fn parse(
        splits: &mut SplitWhitespace<'_>,
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        ctx.enter("ZoneLine");
        let std_offset = next_split(splits, ctx)?.context_parse::<Time>(ctx)?;
        let rule = next_split(splits, ctx)?.context_parse::<RuleIdentifier>(ctx)?;
        let format = next_split(splits, ctx)?.context_parse::<AbbreviationFormat>(ctx)?;
        let columns = splits.collect::<Vec<&str>>();
        let until = if columns.is_empty() {
            None
        } else {
            Some(UntilDateTime::from_columns(&columns, ctx)?)
        };
        ctx.exit();
        Ok(Self {
            std_offset,
            rule,
            format,
            until,
            line_number: ctx.line_number,
        })
    }

    /// Returns the UNTIL instant for the savings in effect at the boundary, or
    /// `END_OF_TIME` for an open line.
    pub fn until_instant(&self, savings: i64) -> i64 {
        self.until.map_or(END_OF_TIME, |until| {
            until.as_precise_ut_time(self.std_offset.as_secs(), savings)
        })
    }
}

/// The `ZoneRecord` represents the zoneinfo files' Zone record.
///
/// A ZoneRecord is made up of a single record, with zero or
/// more continuation lines.
///
/// # Example
///
/// The `America/Chicago` zone record
///
/// ```txt
/// # Zone    NAME        STDOFF    RULES    FORMAT    [UNTIL]
/// Zone America/Chicago    -5:50:36 -    LMT    1883 Nov 18 18:00u
///             -6:00    US    C%sT    1920
///             -6:00    Chicago    C%sT    1936 Mar  1  2:00
///             -5:00    -    EST    1936 Nov 15  2:00
///             -6:00    Chicago    C%sT    1942
///             -6:00    US    C%sT    1946
///             -6:00    Chicago    C%sT    1967
///             -6:00    US    C%sT
/// ```
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ZoneRecord {
    /// The line number of the `Zone` header
    pub line_number: u32,
    /// The zone lines in file order
    pub lines: Vec<ZoneLine>,
}

impl ZoneRecord {
    pub fn new(header: ZoneLine) -> Self {
        Self {
            line_number: header.line_number,
            lines: alloc::vec![header],
        }
    }

    /// Whether the last line of the record is open ended.
    pub fn is_open_ended(&self) -> bool {
        self.lines.last().is_some_and(|line| line.until.is_none())
    }

    /// The names of the rule sets referenced by this zone.
    pub fn rule_set_names(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match &line.rule {
            RuleIdentifier::Named(name) => Some(name.as_str()),
            _ => None,
        })
    }
}
