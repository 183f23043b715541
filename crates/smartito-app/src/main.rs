//! Smartito binary: composition root and interactive session.
//!
//! 1. Parse flags and load configuration from TOML
//! 2. Install tracing
//! 3. Open the warehouse replica and one LLM client per analyst role
//! 4. Read questions from stdin, one turn per line

mod cli;
mod seed;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use smartito_chat::{Orchestrator, WORKFLOW_DIAGRAM};
use smartito_core::config::SmartitoConfig;
use smartito_llm::OpenAiCapability;
use smartito_warehouse::schema::create_funnel_table;
use smartito_warehouse::SqliteWarehouse;

use cli::{expand_home, CliArgs, Command};

const HELP: &str = "\
Ask a question about the funnel, for example:
  ¿Cuál es la tasa de conversión en Brasil para diciembre?
  ¿y en móvil?
  What was the paid traffic in Chile last month?

Commands:
  help     show this message
  diagram  show the turn workflow
  session  show the session summary
  quit     leave
";

async fn run_session(config: &SmartitoConfig) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = config.api_key()?;
    let business_llm = OpenAiCapability::from_config(&config.llm, &config.llm.business, api_key.clone())?;
    let data_llm = OpenAiCapability::from_config(&config.llm, &config.llm.data, api_key)?;

    let replica = expand_home(&config.warehouse.sqlite_path);
    let warehouse = SqliteWarehouse::open(
        &replica,
        &config.warehouse.table,
        Duration::from_millis(config.warehouse.busy_timeout_ms),
    )?;
    tracing::info!(path = %replica.display(), table = %config.warehouse.table, "Warehouse ready");

    let mut orchestrator = Orchestrator::from_config(
        config,
        Arc::new(business_llm),
        Arc::new(data_llm),
        Arc::new(warehouse),
    );
    tracing::info!(session_id = %orchestrator.session().id, "Session started");

    println!("Smartito v{}. Type 'help' for examples, 'quit' to leave.", env!("CARGO_PKG_VERSION"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "quit" | "exit" | "salir" => break,
            "help" | "ayuda" => println!("{}", HELP),
            "diagram" => println!("{}", WORKFLOW_DIAGRAM),
            "session" => println!("{}", orchestrator.session_summary()),
            text => match orchestrator.handle_turn(text).await {
                Ok(outcome) => println!("\n{}\n", outcome.final_answer),
                Err(e) => println!("{}", e),
            },
        }
    }

    println!("\n{}", orchestrator.session_summary());
    Ok(())
}

fn seed_replica(config: &SmartitoConfig, days: u32) -> Result<(), Box<dyn std::error::Error>> {
    let replica = expand_home(&config.warehouse.sqlite_path);
    if replica.exists() {
        std::fs::remove_file(&replica)?;
    }
    let today = chrono::Local::now().date_naive();
    let records = seed::demo_records(today, days);
    create_funnel_table(&replica, &config.warehouse.table, &records)?;
    println!("Wrote {} rows to {}", records.len(), replica.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let loaded = SmartitoConfig::load(&config_file);

    let level = args.resolve_log_level(loaded.as_ref().ok().map(|c| c.general.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Smartito v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Using default configuration");
            SmartitoConfig::default()
        }
    };
    args.apply_overrides(&mut config);

    match args.command {
        Some(Command::Seed { days }) => seed_replica(&config, days),
        Some(Command::InitConfig) => {
            config.save(&config_file)?;
            println!("Configuration written to {}", config_file.display());
            Ok(())
        }
        Some(Command::Chat) | None => run_session(&config).await,
    }
}
