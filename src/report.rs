//! Diagnostics collected over a compilation run.

use core::fmt;

use log::{info, warn};
use zoneinfo_rs::ZoneInfoError;

/// An error together with where it was found.
#[derive(Debug)]
pub struct Diagnostic {
    /// The source file name, when the error can be traced to one.
    pub file: Option<String>,
    /// The source line, when the error can be traced to one.
    pub line: Option<u32>,
    /// The zone or link alias that was dropped because of the error.
    pub zone: Option<String>,
    pub error: ZoneInfoError,
}

impl Diagnostic {
    pub fn new(error: ZoneInfoError) -> Self {
        let line = match &error {
            ZoneInfoError::MalformedRecord(err) => Some(err.line_number()),
            _ => None,
        };
        Self {
            file: None,
            line,
            zone: None,
            error,
        }
    }

    #[must_use]
    pub fn in_file(mut self, file: Option<&str>) -> Self {
        self.file = file.map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn for_zone(mut self, zone: &str) -> Self {
        self.zone = Some(zone.to_owned());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: ")?,
            (Some(file), None) => write!(f, "{file}: ")?,
            (None, Some(line)) => write!(f, "line {line}: ")?,
            (None, None) => {}
        }
        if let Some(zone) = &self.zone {
            write!(f, "[{zone}] ")?;
        }
        write!(f, "{}", self.error)
    }
}

/// The outcome of a compilation run, apart from the compiled data.
#[derive(Debug, Default)]
pub struct CompileReport {
    pub sources: usize,
    pub zones: usize,
    pub links: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileReport {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Logs a summary and then every diagnostic.
    pub fn log(&self) {
        info!(
            "Compiled {} zones and {} links from {} sources with {} diagnostics.",
            self.zones,
            self.links,
            self.sources,
            self.diagnostics.len()
        );
        for diagnostic in &self.diagnostics {
            warn!("{diagnostic}");
        }
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} zones, {} links, {} diagnostics",
            self.zones,
            self.links,
            self.diagnostics.len()
        )
    }
}
