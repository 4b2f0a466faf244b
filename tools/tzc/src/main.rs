//! `tzc` compiles zoneinfo sources into a binary artifact and inspects the
//! zones stored in one.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::{
    eyre::{bail, WrapErr},
    Result,
};
use log::{error, info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use timezone_provider::provider::{
    CandidateEpochSeconds, Disambiguation, IsoDateTime, TimeZoneProvider, TransitionDirection,
    ZoneDataProvider,
};
use tzdb_compiler::{CompilerOptions, TzdbCompiler, TzdbSource};
use zoneinfo_rs::compiled::{TailRule, ZoneInterval};

#[derive(Debug, Parser)]
#[command(name = "tzc", version, about = "Time zone database compiler")]
struct Cli {
    /// Increase logging output, repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile zoneinfo files or tzdata directories into an artifact.
    Compile {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Where to write the artifact.
        #[arg(short, long)]
        output: PathBuf,
        /// Compile zones on a single thread.
        #[arg(long)]
        serial: bool,
        /// Only compile these zones (and the links to them).
        #[arg(long = "zone", value_name = "ID")]
        zones: Vec<String>,
        /// Fail when any diagnostic was reported.
        #[arg(long)]
        strict: bool,
    },
    /// Look up the offset at an instant, or the candidates for a local time.
    Lookup {
        artifact: PathBuf,
        zone: String,
        /// Seconds since the Unix epoch.
        #[arg(
            long,
            allow_hyphen_values = true,
            conflicts_with = "local",
            required_unless_present = "local"
        )]
        instant: Option<i64>,
        /// A local date and time, `YYYY-MM-DDTHH:MM[:SS]`.
        #[arg(long, allow_hyphen_values = true)]
        local: Option<IsoDateTime>,
        #[arg(long, default_value_t = Disambiguation::Compatible)]
        disambiguation: Disambiguation,
    },
    /// Print the intervals, tail rule and POSIX string of a zone as JSON.
    Dump { artifact: PathBuf, zone: String },
}

/// Program entry point.
fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new().with_level(level).init()?;

    match cli.command {
        Command::Compile {
            inputs,
            output,
            serial,
            zones,
            strict,
        } => {
            let mut options = CompilerOptions::default().with_parallel(!serial);
            if !zones.is_empty() {
                options = options.with_zones(zones);
            }
            compile(&inputs, &output, options, strict)
        }
        Command::Lookup {
            artifact,
            zone,
            instant,
            local,
            disambiguation,
        } => {
            let provider = load(&artifact)?;
            match (instant, local) {
                (Some(instant), _) => lookup_instant(&provider, &zone, instant),
                (None, Some(local)) => lookup_local(&provider, &zone, local, disambiguation),
                (None, None) => bail!("either --instant or --local is required"),
            }
        }
        Command::Dump { artifact, zone } => dump(&load(&artifact)?, &zone),
    }
}

fn compile(
    inputs: &[PathBuf],
    output: &Path,
    options: CompilerOptions,
    strict: bool,
) -> Result<()> {
    let mut source = TzdbSource::new();
    for input in inputs {
        source
            .add_path(input)
            .inspect_err(|err| error!("Could not read {}: {err}", input.display()))
            .wrap_err_with(|| format!("could not read `{}`", input.display()))?;
    }
    info!("Read {} source files.", source.len());

    let compiled = TzdbCompiler::new(options).compile(&source);
    println!("{}", compiled.report);

    if strict && !compiled.report.is_clean() {
        for diagnostic in compiled.report.iter() {
            eprintln!("{diagnostic}");
        }
        bail!(
            "{} diagnostics reported, no artifact was written",
            compiled.report.diagnostics.len()
        );
    }

    let size = compiled
        .write_to(output)
        .inspect_err(|err| error!("Could not write {}: {err}", output.display()))
        .wrap_err_with(|| format!("could not write `{}`", output.display()))?;
    println!("Wrote {size} bytes to {}", output.display());
    Ok(())
}

fn load(artifact: &Path) -> Result<ZoneDataProvider> {
    ZoneDataProvider::try_from_path(artifact)
        .wrap_err_with(|| format!("could not load `{}`", artifact.display()))
}

fn lookup_instant(provider: &ZoneDataProvider, zone: &str, instant: i64) -> Result<()> {
    let info = provider.offset_for_instant(zone, instant)?;
    let dst = if info.is_dst { " (DST)" } else { "" };
    println!("{zone} at {instant}: {} {}{dst}", info.offset, info.abbreviation);

    let previous = provider.transition(zone, instant, TransitionDirection::Previous)?;
    let next = provider.transition(zone, instant, TransitionDirection::Next)?;
    println!("previous transition: {}", describe(previous));
    println!("next transition: {}", describe(next));
    Ok(())
}

fn lookup_local(
    provider: &ZoneDataProvider,
    zone: &str,
    local: IsoDateTime,
    disambiguation: Disambiguation,
) -> Result<()> {
    match provider.candidates_for_local(zone, local)? {
        CandidateEpochSeconds::Zero(gap) => println!(
            "no candidates, gap from {} to {} at {}",
            gap.offset_before, gap.offset_after, gap.transition_epoch
        ),
        candidates => {
            for candidate in candidates.as_slice() {
                println!("candidate: {} {}", candidate.epoch, candidate.offset);
            }
        }
    }
    let resolved = provider.resolve_local(zone, local, disambiguation)?;
    println!("{disambiguation}: {} {}", resolved.epoch, resolved.offset);
    Ok(())
}

fn describe(transition: Option<i64>) -> String {
    transition.map_or_else(|| "none".into(), |epoch| epoch.to_string())
}

#[derive(Serialize)]
struct ZoneDump<'a> {
    identifier: &'a str,
    intervals: &'a [ZoneInterval],
    tail: Option<&'a TailRule>,
    posix: Option<String>,
}

fn dump(provider: &ZoneDataProvider, zone: &str) -> Result<()> {
    let identifier = provider.normalize_identifier(zone.as_bytes())?;
    let compiled = provider.zone(&identifier)?;
    let dump = ZoneDump {
        identifier: &identifier,
        intervals: &compiled.intervals,
        tail: compiled.tail.as_ref(),
        posix: compiled.posix_string(),
    };
    serde_json::to_writer_pretty(std::io::stdout().lock(), &dump)?;
    println!();
    Ok(())
}
