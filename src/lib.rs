//! The `tzdb_compiler` crate compiles IANA time zone database sources into a
//! single binary artifact that [`timezone_provider`] loads at runtime.
//!
//! ```no_run
//! use tzdb_compiler::{CompilerOptions, TzdbCompiler, TzdbSource};
//!
//! let mut source = TzdbSource::new();
//! source.add_path("tzdata").unwrap();
//!
//! let output = TzdbCompiler::new(CompilerOptions::default()).compile(&source);
//! for diagnostic in output.report.iter() {
//!     eprintln!("{diagnostic}");
//! }
//! output.write_to("tzdb.bin").unwrap();
//! ```
//!
//! Parsing and compilation never stop at the first error. A malformed line
//! drops that line, a zone that can not be compiled is left out of the
//! artifact, and every such error ends up in the [`CompileReport`].
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod options;
pub mod pipeline;
pub mod report;

pub use options::CompilerOptions;
pub use pipeline::{CompileOutput, SourceFile, TzdbCompiler, TzdbSource};
pub use report::{CompileReport, Diagnostic};

pub use timezone_provider;
pub use zoneinfo_rs;
