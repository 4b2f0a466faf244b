//! Link resolution
//!
//! Links are resolved after every zone is compiled. An alias never gets its
//! own copy of the zone data, it shares the target's [`CompiledZone`].

use alloc::{borrow::ToOwned, string::String, sync::Arc};

use indexmap::IndexMap;

use crate::{compiled::CompiledZone, ZoneInfoError};

/// A `Link TARGET LINK-NAME` record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Link {
    pub target: String,
    pub alias: String,
    pub line_number: u32,
}

/// Resolves aliases, following chained links.
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    links: &'a IndexMap<String, Link>,
}

impl<'a> LinkResolver<'a> {
    pub fn new(links: &'a IndexMap<String, Link>) -> Self {
        Self { links }
    }

    /// Follows the chain of links starting at `alias` to the name of a zone.
    pub fn resolve_target(&self, alias: &str) -> Result<&'a str, ZoneInfoError> {
        let Some(link) = self.links.get(alias) else {
            return Err(self.unknown(alias, alias));
        };
        let mut target = link.target.as_str();
        // A chain can't be longer than the amount of links without a cycle.
        for _ in 0..self.links.len() {
            match self.links.get(target) {
                Some(next) => target = next.target.as_str(),
                None => return Ok(target),
            }
        }
        Err(self.unknown(alias, target))
    }

    /// Resolves `alias` to the compiled data of its target zone.
    ///
    /// `lookup` retrieves an already compiled zone by name.
    pub fn resolve<F>(&self, alias: &str, lookup: F) -> Result<Arc<CompiledZone>, ZoneInfoError>
    where
        F: Fn(&str) -> Option<Arc<CompiledZone>>,
    {
        let target = self.resolve_target(alias)?;
        lookup(target).ok_or_else(|| self.unknown(alias, target))
    }

    fn unknown(&self, alias: &str, target: &str) -> ZoneInfoError {
        ZoneInfoError::UnknownZoneReference {
            alias: alias.to_owned(),
            target: target.to_owned(),
        }
    }
}
