use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use taskforge_cli::replay::replay;
use taskforge_cli::roster::Roster;
use taskforge_cli::services::build_services;
use taskforge_distribution::{ConfigPatch, WeightSettings};
use taskforge_infra::RuntimeConfig;

#[derive(Debug, Parser)]
#[command(name = "taskforge", about = "Turn business events into assigned work")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read NDJSON events from stdin and print one JSON report per generated task.
    Distribute {
        /// JSON roster file (see `roster.rs` for the format).
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Number of anonymous employees when no roster file is given.
        #[arg(long, default_value_t = 3)]
        users: usize,
        /// Print a summary (counts and final workloads) to stderr at the end.
        #[arg(long)]
        summary: bool,
    },
    /// Show or change the distribution policy.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        skill: Option<f64>,
        #[arg(long)]
        workload: Option<f64>,
        #[arg(long)]
        history: Option<f64>,
        #[arg(long)]
        availability: Option<f64>,
        #[arg(long)]
        max_utilization: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskforge_observability::init();

    let cli = Cli::parse();
    let runtime = RuntimeConfig::from_env()?;
    let services = build_services(&runtime).await?;

    match cli.command {
        Command::Distribute { roster, users, summary } => {
            let roster = match roster {
                Some(path) => Roster::load(&path)?,
                None => Roster::anonymous(users),
            };
            services.apply_roster(&roster);

            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout().lock();
            let mut report = replay(&services.orchestrator, stdin, &mut stdout).await?;

            if summary {
                report.workloads = Some(services.orchestrator.all_workloads().await?);
                let mut stderr = std::io::stderr().lock();
                serde_json::to_writer_pretty(&mut stderr, &report)?;
                writeln!(stderr)?;
            }
        }
        Command::Config { action } => {
            let config = match action {
                ConfigAction::Show => services.config.get_config().await,
                ConfigAction::Set {
                    skill,
                    workload,
                    history,
                    availability,
                    max_utilization,
                } => {
                    let patch = ConfigPatch {
                        weights: WeightSettings {
                            skill,
                            workload,
                            history,
                            availability,
                        },
                        max_utilization,
                    };
                    services.config.set_config(patch).await.context("updating distribution config")?
                }
            };

            let view = serde_json::json!({
                "config": &*config,
                "effective_weights": config.effective_weights(),
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
