use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use geoinv_driver::{
    DriverError, InversionDriver, ManifestOpener, ProcessEngine, RunOutcome, SweepDriver,
};
use geoinv_options::{template, workflow_template, FieldValue, UiJson, WorkflowKind};

#[derive(Parser, Debug)]
#[command(name = "geoinv", about = "Validate and launch geophysical forward and inversion runs")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a UI-description file and report every violation
    Validate {
        file: PathBuf,
        /// Skip the store and all reference checks
        #[arg(long)]
        offline: bool,
        /// Override a field, e.g. --set chi_factor=2.0
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        overrides: Vec<String>,
    },
    /// Run a forward simulation or inversion
    Run {
        file: PathBuf,
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        overrides: Vec<String>,
        /// Python interpreter used to launch the inversion library
        #[arg(long, default_value = "python")]
        python: String,
        /// Ignore conda_environment and launch the interpreter directly
        #[arg(long)]
        no_conda: bool,
    },
    /// Expand a sweep file and execute the runs
    Sweep {
        file: PathBuf,
        /// Show the runs without writing or executing anything
        #[arg(long)]
        dry_run: bool,
        /// Write the run files and store copies without executing them
        #[arg(long, conflicts_with = "dry_run")]
        prepare_only: bool,
        /// Worker threads (default: from the file, then physical cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
        #[arg(long, default_value = "python")]
        python: String,
        #[arg(long)]
        no_conda: bool,
    },
    /// Print the built-in UI-description template of an inversion type or
    /// workflow (sensitivity_cutoff, homogeneous, plate_simulation)
    Template {
        inversion_type: String,
        /// Forward simulation template
        #[arg(long)]
        forward: bool,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// `FIELD=VALUE`; the value is read as JSON when it parses, else as text.
fn parse_override(raw: &str) -> Result<(String, FieldValue), DriverError> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| DriverError::ConfigError(format!("expected FIELD=VALUE, got '{}'", raw)))?;
    let json = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.trim().to_string(), FieldValue::from_json(&json)))
}

fn parse_overrides(raw: &[String]) -> Result<Vec<(String, FieldValue)>, DriverError> {
    raw.iter().map(|r| parse_override(r)).collect()
}

fn engine(python: &str, no_conda: bool) -> ProcessEngine {
    let engine = ProcessEngine::new().with_python(python);
    if no_conda {
        engine.without_conda()
    } else {
        engine
    }
}

fn validate(file: &Path, offline: bool, overrides: &[String]) -> Result<(), DriverError> {
    let ui = UiJson::from_file(file)?;
    let overrides = parse_overrides(overrides)?;
    let driver = InversionDriver::new(ProcessEngine::new(), ManifestOpener);
    if let Some(kind) = WorkflowKind::detect(&ui) {
        let options = driver.validate_workflow(kind, &ui, file, &overrides, offline)?;
        println!("✓ {} is a valid {}", file.display(), options.title);
        return Ok(());
    }
    let options = driver.validate_ui(&ui, file, &overrides, offline)?;
    println!(
        "✓ {} is a valid {} ({} component(s): {})",
        file.display(),
        options.kind.title(options.forward_only),
        options.active_components().len(),
        options.active_components().join(", ")
    );
    Ok(())
}

fn run(file: &Path, overrides: &[String], python: &str, no_conda: bool) -> Result<(), DriverError> {
    let ui = UiJson::from_file(file)?;
    let overrides = parse_overrides(overrides)?;
    let driver = InversionDriver::new(engine(python, no_conda), ManifestOpener);
    match driver.run_ui(&ui, file, &overrides)? {
        RunOutcome::Completed(summary) => {
            println!(
                "✓ {} completed in {:.2}s",
                summary.route.title(),
                summary.duration.as_secs_f64()
            );
            for artifact in &summary.artifacts {
                println!("  {:?}: {}", artifact.kind, artifact.path.display());
            }
        }
        RunOutcome::SweepTemplate(path) => {
            println!("sweep template written to {}", path.display());
        }
    }
    Ok(())
}

fn sweep(
    file: &Path,
    dry_run: bool,
    prepare_only: bool,
    threads: Option<usize>,
    python: &str,
    no_conda: bool,
) -> Result<(), DriverError> {
    let sweep = SweepDriver::from_file(file, threads)?;

    if dry_run {
        sweep.dry_run().print_report();
        return Ok(());
    }

    if prepare_only {
        let paths = sweep.prepare(&ManifestOpener)?;
        println!("wrote {} run file(s) to {}", paths.len(), sweep.output_dir().display());
        return Ok(());
    }

    let driver = InversionDriver::new(engine(python, no_conda), ManifestOpener);
    let stats = sweep.run(&driver)?;
    if stats.failed > 0 {
        return Err(DriverError::RunsFailed {
            failed: stats.failed,
            total: stats.total_runs,
        });
    }
    Ok(())
}

fn write_template(
    inversion_type: &str,
    forward: bool,
    output: Option<&Path>,
) -> Result<(), DriverError> {
    let (ui, name) = match WorkflowKind::from_name(inversion_type) {
        Some(kind) if !forward => (workflow_template(kind), kind.to_string()),
        _ => {
            let route = geoinv_driver::dispatch(Some(inversion_type), forward)?;
            (template(route.kind, route.forward_only), route.to_string())
        }
    };
    let text = ui.to_string_pretty()?;
    match output {
        Some(path) => {
            fs::write(path, text)?;
            info!("wrote {} template to {}", name, path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Command::Validate {
            file,
            offline,
            overrides,
        } => validate(file, *offline, overrides),
        Command::Run {
            file,
            overrides,
            python,
            no_conda,
        } => run(file, overrides, python, *no_conda),
        Command::Sweep {
            file,
            dry_run,
            prepare_only,
            threads,
            python,
            no_conda,
        } => sweep(file, *dry_run, *prepare_only, *threads, python, *no_conda),
        Command::Template {
            inversion_type,
            forward,
            output,
        } => write_template(inversion_type, *forward, output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
