use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use planwise::core::{PlanConfig, run_plan_with_statutory_tables};

#[derive(Parser, Debug)]
#[command(
    name = "planwise",
    about = "Year-by-year household plan projection (salary, equity, deferred comp, taxes, withdrawals)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one plan from a JSON config file and print the result.
    Plan {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, help = "Print only this year's record")]
        year: Option<i32>,
    },
}

fn run_plan_command(config_path: &Path, year: Option<i32>) -> Result<String, String> {
    let raw = fs::read_to_string(config_path)
        .map_err(|e| format!("failed to read {}: {e}", config_path.display()))?;
    let config: PlanConfig =
        serde_json::from_str(&raw).map_err(|e| format!("Invalid plan JSON: {e}"))?;
    let result = run_plan_with_statutory_tables(&config).map_err(|e| e.to_string())?;

    let json = match year {
        Some(year) => {
            let record = result.year(year).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(record)
        }
        None => serde_json::to_string_pretty(&result),
    };
    json.map_err(|e| format!("failed to serialize result: {e}"))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = planwise::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                process::exit(1);
            }
        }
        Command::Plan { config, year } => match run_plan_command(&config, year) {
            Ok(json) => println!("{json}"),
            Err(msg) => {
                eprintln!("{msg}");
                process::exit(1);
            }
        },
    }
}
