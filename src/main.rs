use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use stdcm_core::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod report;
mod scenario;

use report::{Report, RequestReport};
use scenario::Scenario;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plans every request of a scenario and writes a JSON report
    Plan {
        /// Scenario file
        #[arg(value_name = "*.toml")]
        scenario: PathBuf,
        /// Report file, stdout when omitted
        #[arg(short, long, value_name = "*.json")]
        output: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Validates a configuration file and prints it with all defaults filled in
    CheckConfig {
        #[arg(value_name = "*.toml")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let res = match cli.command {
        Commands::Plan {
            scenario,
            output,
            pretty,
        } => run_plan(&scenario, output.as_deref(), pretty),
        Commands::CheckConfig { config } => check_config(&config),
    };
    match res {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_plan(
    scenario: &Path,
    output: Option<&Path>,
    pretty: bool,
) -> Result<ExitCode, Error> {
    let loaded = Scenario::from_file(scenario)?;
    info!(
        scenario = %loaded.name,
        blocks = loaded.network.block_count(),
        requests = loaded.requests.len(),
        "loaded scenario"
    );

    let start = Instant::now();
    let reports: Vec<RequestReport> = loaded
        .requests
        .into_par_iter()
        .map(|(name, request)| {
            let res = plan_path(&loaded.network, &loaded.occupancies, &request, &loaded.config);
            match &res {
                Ok(response) => info!(
                    request = %name,
                    departure = response.departure_time,
                    arrival = response.arrival_time,
                    "planned"
                ),
                Err(e) => warn!(request = %name, "planning failed: {e}"),
            }
            RequestReport::new(name, res)
        })
        .collect();
    let report = Report::new(loaded.name, reports);
    info!(
        planned = report.planned,
        failed = report.failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "done"
    );

    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            report.write_json(&mut writer, pretty)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            report.write_json(&mut stdout, pretty)?;
            writeln!(stdout)?;
        }
    }

    Ok(if report.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check_config(path: &Path) -> Result<ExitCode, Error> {
    let config = StdcmConfig::from_file(path)?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| Error::InvalidConfig(format!("can't render configuration: {e}")))?;
    print!("{rendered}");
    Ok(ExitCode::SUCCESS)
}
