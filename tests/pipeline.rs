use std::{fs, path::PathBuf, sync::Arc};

use timezone_provider::{
    binary::ZoneData,
    provider::{TimeZoneProvider, ZoneDataProvider},
};
use tzdb_compiler::{CompilerOptions, TzdbCompiler, TzdbSource};
use zoneinfo_rs::{parser::ZoneInfoParseError, ZoneInfoError};

const EXCERPT: &str = include_str!("../zoneinfo/tests/data/tzdata_excerpt.zi");

const FOO: &str = "# Test rules
Rule Foo 1990 max - Oct lastSun 2:00 0 -
Rule Foo 1990 max - Apr Sun>=1 2:00 1:00 D
Zone Test/Foo -5:00 Foo X%sT
";

fn serial() -> TzdbCompiler {
    TzdbCompiler::new(CompilerOptions::default().with_parallel(false))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tzdb_compiler-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn malformed_rule_line_does_not_abort() {
    let mut source = TzdbSource::new();
    source.add_str("foo", FOO);
    source.add_str(
        "broken",
        "Rule Bar 1990 max - Apr\nZone Test/Fixed 1:00 - FXT\n",
    );
    let output = serial().compile(&source);

    assert_eq!(output.report.diagnostics.len(), 1);
    let diagnostic = &output.report.diagnostics[0];
    assert_eq!(diagnostic.file.as_deref(), Some("broken"));
    assert_eq!(diagnostic.line, Some(1));
    assert!(matches!(diagnostic.error, ZoneInfoError::MalformedRecord(_)));

    let data = ZoneData::from_bytes(&output.to_bytes()).unwrap();
    let identifiers: Vec<_> = data.identifiers().collect();
    assert_eq!(identifiers, ["Test/Fixed", "Test/Foo"]);
}

#[test]
fn failed_zone_is_left_out() {
    let mut source = TzdbSource::new();
    source.add_str("foo", FOO);
    source.add_str(
        "zones",
        "Zone Test/Unknown 1:00 Nope U%sT\nLink Test/Unknown Test/Alias\n",
    );
    let output = TzdbCompiler::default().compile(&source);

    assert_eq!(output.zones.len(), 1);
    assert!(output.zones.contains_key("Test/Foo"));

    let zones: Vec<_> = output
        .report
        .iter()
        .map(|diagnostic| diagnostic.zone.as_deref().unwrap())
        .collect();
    assert_eq!(zones, ["Test/Unknown", "Test/Alias"]);
    assert!(matches!(
        output.report.diagnostics[0].error,
        ZoneInfoError::MalformedZone { .. }
    ));
    assert!(matches!(
        output.report.diagnostics[1].error,
        ZoneInfoError::UnknownZoneReference { .. }
    ));
}

#[test]
fn alternating_tail_rule() {
    let mut source = TzdbSource::new();
    source.add_str("foo", FOO);
    let output = serial().compile(&source);
    assert!(output.report.is_clean());

    let zone = &output.zones["Test/Foo"];
    let tail = zone.tail.as_ref().unwrap();
    assert_eq!(tail.rules.recurrences().len(), 2);

    // 1990-01-01T00:00Z to 2001-01-01T00:00Z
    let mut instant = 631_152_000;
    let mut transitions = Vec::new();
    while let Some(next) = zone.next_transition(instant).unwrap() {
        if next >= 978_307_200 {
            break;
        }
        assert!(next > instant);
        transitions.push(next);
        instant = next;
    }
    assert_eq!(transitions.len(), 22);

    let names: Vec<_> = transitions
        .iter()
        .map(|&at| zone.interval_for_instant(at).unwrap().unwrap().name)
        .collect();
    for pair in names.chunks(2) {
        assert_eq!(pair, ["XDT", "XT"]);
    }
}

#[test]
fn parallel_and_serial_agree() {
    let mut source = TzdbSource::new();
    source.add_str("tzdata.zi", EXCERPT);

    let parallel = TzdbCompiler::default().compile(&source);
    let serial = serial().compile(&source);
    assert!(parallel.report.is_clean());
    assert_eq!(parallel.zones.len(), 14);
    assert_eq!(parallel.zones, serial.zones);
    assert_eq!(parallel.to_bytes(), serial.to_bytes());

    assert!(Arc::ptr_eq(
        &parallel.zones["Eire"],
        &parallel.zones["Europe/Dublin"]
    ));
}

#[test]
fn link_shadowing_a_zone_is_skipped() {
    let mut source = TzdbSource::new();
    source.add_str("foo", FOO);
    source.add_str("links", "Zone Test/Fixed 1:00 - FXT\nLink Test/Fixed Test/Foo\n");
    let output = serial().compile(&source);

    assert_eq!(output.report.links, 0);
    assert_eq!(output.report.diagnostics.len(), 1);
    let diagnostic = &output.report.diagnostics[0];
    assert_eq!(diagnostic.file.as_deref(), Some("links"));
    assert!(matches!(
        &diagnostic.error,
        ZoneInfoError::MalformedRecord(ZoneInfoParseError::DuplicateIdentifier(2, alias)) if alias == "Test/Foo"
    ));
    assert!(output.zones["Test/Foo"].tail.is_some());
}

#[test]
fn directory_to_artifact() {
    let dir = scratch_dir("directory");
    fs::write(dir.join("tzdata.zi"), EXCERPT).unwrap();

    let mut source = TzdbSource::new();
    source.add_path(&dir).unwrap();
    assert_eq!(source.len(), 1);

    let output = TzdbCompiler::default().compile(&source);
    let artifact = dir.join("tzdb.bin");
    let written = output.write_to(&artifact).unwrap();
    assert_eq!(written, output.to_bytes().len());

    let provider = ZoneDataProvider::try_from_path(&artifact).unwrap();
    let info = provider.offset_for_instant("us/eastern", 0).unwrap();
    assert_eq!((info.offset.0, info.abbreviation.as_str()), (-18_000, "EST"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_sources() {
    let dir = scratch_dir("empty");
    let mut source = TzdbSource::new();
    assert!(matches!(source.add_path(&dir), Err(ZoneInfoError::Io(_))));
    assert!(matches!(
        source.add_path(dir.join("northamerica")),
        Err(ZoneInfoError::Io(_))
    ));
    assert!(source.is_empty());
    fs::remove_dir_all(&dir).unwrap();
}
