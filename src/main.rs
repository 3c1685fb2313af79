use anyhow::{Context, Result};
use clap::Parser;
use phasemeter::attribution::{read_result_file, write_result_file};
use phasemeter::cli::{Cli, Command, OutputFormat};
use phasemeter::config::AttributionConfig;
use phasemeter::monitor::{MonitorOutput, MonitorOutputParser};
use phasemeter::report::AttributionReport;
use phasemeter::scenario::Scenario;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_attribute(
    scenario_path: &Path,
    config_path: Option<PathBuf>,
    format: Option<OutputFormat>,
    workers: Option<u16>,
    save: Option<PathBuf>,
    include_unused: bool,
) -> Result<()> {
    // Flags override the config file
    let mut config = match config_path {
        Some(path) => AttributionConfig::from_toml_file(path)?,
        None => AttributionConfig::default(),
    };
    if let Some(format) = format {
        config.output_format = format.into();
    }
    if let Some(workers) = workers {
        config.worker_threads = usize::from(workers);
    }
    config.include_unused |= include_unused;

    let built = Scenario::from_file(scenario_path)?.build()?;
    let result = built
        .attribute(config.worker_threads)
        .context("Resource attribution failed")?;

    if let Some(path) = save {
        write_result_file(&path, &result)
            .with_context(|| format!("Failed to write result file {}", path.display()))?;
        info!(path = %path.display(), "saved attribution result");
    }

    let report = AttributionReport::from_step_result(&result, config.include_unused)?;
    print!("{}", report.render(config.output_format, config.precision)?);
    Ok(())
}

fn run_inspect(
    scenario_path: &Path,
    result_path: &Path,
    format: OutputFormat,
    include_unused: bool,
) -> Result<()> {
    let built = Scenario::from_file(scenario_path)?.build()?;
    let result = read_result_file(result_path, &built.context(), &built.providers)
        .with_context(|| format!("Failed to load result file {}", result_path.display()))?;

    let report = AttributionReport::from_step_result(&result, include_unused)?;
    print!(
        "{}",
        report.render(format.into(), AttributionConfig::default().precision)?
    );
    Ok(())
}

fn print_monitor_summary(output: &MonitorOutput) {
    if output.machines.is_empty() {
        println!("No monitored hosts found.");
        return;
    }

    println!(
        "{:<24} {:>5} {:>10} {:>10} {:>14} {:>14} {:>10}",
        "host", "cores", "cpu mean", "cpu peak", "net rx B/s", "net tx B/s", "disk busy"
    );
    for machine in &output.machines {
        let rx: f64 = machine
            .network
            .interfaces
            .values()
            .map(|i| i.received.mean())
            .sum();
        let tx: f64 = machine
            .network
            .interfaces
            .values()
            .map(|i| i.transmitted.mean())
            .sum();
        let busy = machine
            .disks
            .disks
            .values()
            .map(|d| d.busy.peak())
            .fold(0.0, f64::max);
        println!(
            "{:<24} {:>5} {:>10.2} {:>10.2} {:>14.0} {:>14.0} {:>9.1}%",
            machine.hostname,
            machine.cpu.num_cores,
            machine.cpu.total.mean(),
            machine.cpu.total.peak(),
            rx,
            tx,
            busy * 100.0
        );
    }
}

fn run_monitor(dir: &Path, json: bool) -> Result<()> {
    let output = MonitorOutputParser::parse_directory(dir)
        .with_context(|| format!("Failed to parse monitor output in {}", dir.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_monitor_summary(&output);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.command {
        Command::Attribute {
            scenario,
            config,
            format,
            workers,
            save,
            include_unused,
        } => run_attribute(&scenario, config, format, workers, save, include_unused),
        Command::Inspect {
            scenario,
            result,
            format,
            include_unused,
        } => run_inspect(&scenario, &result, format, include_unused),
        Command::Monitor { dir, json } => run_monitor(&dir, json),
    }
}
