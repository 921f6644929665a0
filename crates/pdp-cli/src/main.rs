//! Demonstration client for the policy decision point: wires a handful
//! of in-memory documents and mock attribute finders into an orchestrator
//! and prints its decision stream as JSON lines.

#![deny(unsafe_code)]

mod scenarios;

use clap::{Parser, Subcommand};
use futures::StreamExt;

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pdp-cli", about = "Demonstration client for the policy decision point")]
struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    cmd: Command,
}

/// The `pdp-cli` subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in demonstration scenarios
    ListScenarios,
    /// Run a scenario and print its decision stream as JSON lines
    Run {
        /// One of the names printed by `list-scenarios`.
        #[arg(short, long)]
        scenario: String,
        /// Stop after this many emitted decisions (a streaming scenario's
        /// decision sequence never completes on its own).
        #[arg(long, default_value_t = 5)]
        max_decisions: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_json_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::ListScenarios => cmd_list_scenarios(),
        Command::Run { scenario, max_decisions } => cmd_run(&scenario, max_decisions).await?,
    }
    Ok(())
}

fn cmd_list_scenarios() {
    for name in scenarios::names() {
        println!("{name}");
    }
}

async fn cmd_run(scenario: &str, max_decisions: usize) -> Result<(), Box<dyn std::error::Error>> {
    let Some(scenario) = scenarios::build(scenario) else {
        return Err(format!("unknown scenario {scenario:?}; see `pdp-cli list-scenarios`").into());
    };
    let mut decisions = scenario.pdp.decisions(scenario.subscription);
    let mut emitted = 0usize;
    while emitted < max_decisions {
        let Some(decision) = decisions.next().await else { break };
        println!("{}", serde_json::to_string(&decision.to_json())?);
        emitted += 1;
    }
    Ok(())
}
