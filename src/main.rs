//! fwts - Firmware Warning/Test Suite: ACPI, SMBIOS and TPM firmware table
//! validation.
//!
//! Loads firmware tables either from an acpidump-style dump file or, on
//! Linux, straight out of `/sys/firmware/acpi/tables`, runs the registered
//! table parsers against them, and reports findings at the requested
//! severity and format.

use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;

use fwts::error::CliError;
use fwts::harness::{self, CancellationToken};
use fwts::model::Severity;
use fwts::registry::{self, DumpFileSource, TableRegistry};
use fwts::sink::{JsonSink, ResultSink, TextSink};

#[derive(Parser, Debug)]
#[command(name = "fwts")]
#[command(about = "Firmware Warning/Test Suite")]
struct Args {
    /// Minimum severity to report as a failure (critical, high, medium, low)
    #[arg(long, default_value = "low")]
    severity: String,

    /// Output format (plain, json)
    #[arg(long, default_value = "plain")]
    format: String,

    /// Read tables from an acpidump-style dump file instead of firmware
    #[arg(long)]
    dumpfile: Option<String>,

    /// Comma-separated stable tags to suppress
    #[arg(long)]
    ignore: Option<String>,

    /// Only run tests whose name matches this substring
    #[arg(long)]
    test: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(had_critical_or_high) => {
            if had_critical_or_high {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{e}");
            eprintln!("[fwts] error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let min_severity = Severity::from_str(&args.severity)?;

    let mut registry = TableRegistry::new();
    load_tables(args, &mut registry)?;
    log::info!("loaded {} table(s) into the registry", registry.len());

    let mut sink: Box<dyn ResultSink> = match args.format.as_str() {
        "plain" => Box::new(TextSink::stderr()),
        "json" => Box::new(JsonSink::new()),
        other => return Err(Box::new(CliError::UnknownFormat(other.to_string()))),
    };
    sink.set_min_severity(min_severity);
    if let Some(ignore) = &args.ignore {
        for tag in ignore.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            sink.add_ignored_tag(tag);
        }
    }

    let manifest = harness::manifest::manifest();
    harness::run_all(
        &manifest,
        &registry,
        sink.as_mut(),
        args.test.as_deref(),
        &CancellationToken::new(),
        None,
    );

    sink.render_summary(&mut std::io::stdout())?;
    Ok(sink.has_critical_or_high_failure())
}

#[cfg(target_os = "linux")]
fn load_tables(args: &Args, registry: &mut TableRegistry) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &args.dumpfile {
        log::info!("reading tables from dump file {path}");
        let source = DumpFileSource::from_path(path)?;
        registry.load_from(&source)?;
    } else {
        log::info!("reading tables from /sys/firmware/acpi/tables");
        let source = registry::sources::linux::SysfsAcpiSource::new();
        registry.load_from(&source)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn load_tables(args: &Args, registry: &mut TableRegistry) -> Result<(), Box<dyn std::error::Error>> {
    match &args.dumpfile {
        Some(path) => {
            log::info!("reading tables from dump file {path}");
            let source = DumpFileSource::from_path(path)?;
            registry.load_from(&source)?;
            Ok(())
        }
        None => Err("live firmware acquisition requires Linux; pass --dumpfile on this platform".into()),
    }
}
