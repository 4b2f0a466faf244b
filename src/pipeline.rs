//! The batch compilation pipeline.
//!
//! A run reads every source up front, parses each file on its own so that
//! diagnostics can name it, merges the results and then compiles the zones
//! against the merged rule sets. Links are resolved last and share the
//! compiled data of their target.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::Path,
    sync::Arc,
};

use log::{debug, info};
use rayon::prelude::*;
use timezone_provider::binary::BinaryZoneWriter;
use zoneinfo_rs::{
    compiled::CompiledZone, compiler::ZoneCompiler, link::LinkResolver,
    parser::ZoneInfoParseError, zone::ZoneRecord, ZoneInfoData, ZoneInfoError, ZONEINFO_FILES,
};

use crate::{
    options::CompilerOptions,
    report::{CompileReport, Diagnostic},
};

/// The compact single-file form of the database.
pub const COMPACT_FILE: &str = "tzdata.zi";

/// A named piece of zoneinfo source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

/// The zoneinfo sources of one compilation run.
#[derive(Debug, Clone, Default)]
pub struct TzdbSource {
    files: Vec<SourceFile>,
}

impl TzdbSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds source text under the given name.
    pub fn add_str(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.files.push(SourceFile {
            name: name.into(),
            contents: contents.into(),
        });
    }

    /// Reads a zoneinfo file, or a tzdata directory.
    ///
    /// A directory is read through its well-known region files. When those
    /// are not all present, its `tzdata.zi` is read instead.
    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ZoneInfoError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return self.add_file(path);
        }
        if ZONEINFO_FILES.iter().all(|name| path.join(name).is_file()) {
            for name in ZONEINFO_FILES {
                self.add_file(&path.join(name))?;
            }
            return Ok(());
        }
        let compact = path.join(COMPACT_FILE);
        if compact.is_file() {
            return self.add_file(&compact);
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a tzdata directory", path.display()),
        )
        .into())
    }

    fn add_file(&mut self, path: &Path) -> Result<(), ZoneInfoError> {
        let contents = fs::read_to_string(path)?;
        debug!("Read {} ({} bytes).", path.display(), contents.len());
        self.add_str(path.display().to_string(), contents);
        Ok(())
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Parses every file and merges the records.
    ///
    /// Unparsable lines and duplicate names are pushed to `report` with the
    /// file they were found in.
    pub fn parse(&self, report: &mut CompileReport) -> ParsedSources {
        let mut parsed = ParsedSources::default();
        for file in &self.files {
            let mut data = ZoneInfoData::from_zoneinfo_file(&file.contents);
            debug!(
                "Parsed {}: {} rule sets, {} zones, {} links.",
                file.name,
                data.rules.len(),
                data.zones.len(),
                data.links.len()
            );
            for err in data.errors.drain(..) {
                report.push(Diagnostic::new(err.into()).in_file(Some(&file.name)));
            }
            for name in data.zones.keys() {
                let _ = parsed
                    .zone_files
                    .entry(name.clone())
                    .or_insert_with(|| file.name.clone());
            }
            for alias in data.links.keys() {
                let _ = parsed
                    .link_files
                    .entry(alias.clone())
                    .or_insert_with(|| file.name.clone());
            }

            // Anything pushed while merging is a duplicate from this file.
            parsed.data.extend(data);
            for err in parsed.data.errors.drain(..) {
                report.push(Diagnostic::new(err.into()).in_file(Some(&file.name)));
            }
        }
        report.sources = self.files.len();
        parsed
    }
}

/// Merged records of every source, with the file each zone and link came from.
#[derive(Debug, Default)]
pub struct ParsedSources {
    pub data: ZoneInfoData,
    zone_files: BTreeMap<String, String>,
    link_files: BTreeMap<String, String>,
}

impl ParsedSources {
    pub fn zone_file(&self, zone: &str) -> Option<&str> {
        self.zone_files.get(zone).map(String::as_str)
    }

    pub fn link_file(&self, alias: &str) -> Option<&str> {
        self.link_files.get(alias).map(String::as_str)
    }
}

/// Compiled zones and aliases of a run, keyed by identifier.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub zones: BTreeMap<String, Arc<CompiledZone>>,
    pub report: CompileReport,
}

impl CompileOutput {
    /// Encodes every zone and alias into a binary artifact.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryZoneWriter::new();
        for (identifier, zone) in &self.zones {
            writer.add_zone(identifier, zone);
        }
        writer.finish()
    }

    /// Writes the binary artifact to `path`, returning its size in bytes.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<usize> {
        let bytes = self.to_bytes();
        fs::write(path.as_ref(), &bytes)?;
        info!("Wrote {} bytes to {}.", bytes.len(), path.as_ref().display());
        Ok(bytes.len())
    }
}

/// Runs the pipeline with a set of [`CompilerOptions`].
#[derive(Debug, Clone, Default)]
pub struct TzdbCompiler {
    options: CompilerOptions,
}

impl TzdbCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Parses and compiles `source`. Errors never abort the run, they are
    /// collected in the report of the output.
    pub fn compile(&self, source: &TzdbSource) -> CompileOutput {
        let mut report = CompileReport::default();
        let parsed = source.parse(&mut report);
        info!(
            "Parsed {} sources: {} rule sets, {} zones, {} links.",
            source.len(),
            parsed.data.rules.len(),
            parsed.data.zones.len(),
            parsed.data.links.len()
        );
        self.compile_parsed(&parsed, report)
    }

    /// Compiles already parsed sources, adding to `report`.
    pub fn compile_parsed(&self, parsed: &ParsedSources, mut report: CompileReport) -> CompileOutput {
        let data = &parsed.data;
        let resolver = LinkResolver::new(&data.links);
        let targets = self.selected_targets(data, &resolver, &mut report);

        let selected: Vec<(&String, &ZoneRecord)> = data
            .zones
            .iter()
            .filter(|(identifier, _)| {
                targets
                    .as_ref()
                    .is_none_or(|targets| targets.contains(identifier.as_str()))
            })
            .collect();

        let compile = |(identifier, record): &(&String, &ZoneRecord)| {
            debug!("Compiling {identifier}.");
            let result = ZoneCompiler::new(identifier, &data.rules).compile(record);
            ((*identifier).clone(), record.line_number, result)
        };
        let results: Vec<_> = if self.options.parallel {
            selected.par_iter().map(compile).collect()
        } else {
            selected.iter().map(compile).collect()
        };

        let mut zones = BTreeMap::new();
        for (identifier, line, result) in results {
            match result {
                Ok(zone) => {
                    debug!(
                        "{identifier}: {} intervals, tail: {}.",
                        zone.intervals.len(),
                        zone.tail.is_some()
                    );
                    let _ = zones.insert(identifier, Arc::new(zone));
                }
                Err(err) => report.push(
                    Diagnostic::new(err)
                        .in_file(parsed.zone_file(&identifier))
                        .at_line(line)
                        .for_zone(&identifier),
                ),
            }
        }
        report.zones = zones.len();

        let mut aliases = Vec::new();
        for (alias, link) in &data.links {
            let diagnostic = |err: ZoneInfoError| {
                Diagnostic::new(err)
                    .in_file(parsed.link_file(alias))
                    .at_line(link.line_number)
                    .for_zone(alias)
            };
            if data.zones.contains_key(alias) {
                report.push(diagnostic(
                    ZoneInfoParseError::DuplicateIdentifier(link.line_number, alias.clone()).into(),
                ));
                continue;
            }
            if let (Some(targets), Ok(target)) = (&targets, resolver.resolve_target(alias)) {
                if !targets.contains(target) {
                    continue;
                }
            }
            match resolver.resolve(alias, |identifier| zones.get(identifier).cloned()) {
                Ok(zone) => aliases.push((alias.clone(), zone)),
                Err(err) => report.push(diagnostic(err)),
            }
        }
        report.links = aliases.len();
        zones.extend(aliases);

        report.log();
        CompileOutput { zones, report }
    }

    /// The zones to compile, or `None` to compile all of them.
    fn selected_targets<'a>(
        &'a self,
        data: &'a ZoneInfoData,
        resolver: &LinkResolver<'a>,
        report: &mut CompileReport,
    ) -> Option<BTreeSet<&'a str>> {
        let requested = self.options.zones.as_ref()?;
        let mut targets: BTreeSet<&str> = data
            .zones
            .keys()
            .map(String::as_str)
            .filter(|identifier| self.options.selects(identifier))
            .collect();
        // Broken links are reported when the aliases are resolved.
        for alias in data.links.keys().filter(|alias| self.options.selects(alias)) {
            if let Ok(target) = resolver.resolve_target(alias) {
                let _ = targets.insert(target);
            }
        }
        for identifier in requested {
            if !data.zones.contains_key(identifier) && !data.links.contains_key(identifier) {
                if let Err(err) = resolver.resolve_target(identifier) {
                    report.push(Diagnostic::new(err).for_zone(identifier));
                }
            }
        }
        Some(targets)
    }
}
