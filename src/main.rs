mod cli;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use lifelens::config::Config;
use lifelens::core::{AnswerRecord, LogRecord, SqliteStore};
use lifelens::InsightService;

#[derive(Deserialize)]
struct ImportBatch {
    #[serde(default)]
    logs: Vec<LogRecord>,
    #[serde(default)]
    answers: Vec<AnswerRecord>,
}

fn print_json<T: Serialize>(title: &str, user: &str, value: &T) -> Result<()> {
    println!("{} {}", title.cyan().bold(), user.dimmed());
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn import(service: &InsightService<SqliteStore>, file: &Path, strict_pacing: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let batch: ImportBatch = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    for log in &batch.logs {
        service.store().insert_log(log)?;
    }

    let mut skipped = 0;
    for answer in &batch.answers {
        if strict_pacing {
            if !service.submit_answer(answer)?.should_show_prompt {
                skipped += 1;
            }
        } else {
            service.store().insert_answer(answer)?;
        }
    }

    println!(
        "{} {} logs, {} answers",
        "Imported".green().bold(),
        batch.logs.len(),
        batch.answers.len() - skipped
    );
    if skipped > 0 {
        println!("{}", format!("{} answers over the daily quota were skipped", skipped).yellow());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::new(cli.config)?;
    if let Some(db) = cli.db {
        config.database = Some(db);
    }
    if let Some(timezone) = cli.timezone {
        config.timezone = timezone;
    }
    let tz = config.tz()?;

    let db_path = config.database_path();
    let store = SqliteStore::new(db_path.clone())
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let service = InsightService::new(store, tz).with_options(config.insight_options());
    let as_of = cli.at.unwrap_or_else(Utc::now);

    match cli.command {
        Commands::Import { file } => import(&service, &file, config.strict_pacing)?,
        Commands::Profile { user } => print_json("Profile", &user, &service.profile(&user, as_of)?)?,
        Commands::Classify { user } => {
            print_json("Classification", &user, &service.classification(&user, as_of)?)?
        }
        Commands::Matches { user } => print_json("Matches", &user, &service.matches(&user, as_of)?)?,
        Commands::Pacing { user } => print_json("Pacing", &user, &service.pacing(&user, as_of)?)?,
        Commands::Energy { user } => print_json("Energy", &user, &service.energy(&user, as_of)?)?,
        Commands::Intervention { user } => {
            print_json("Intervention", &user, &service.intervention(&user, as_of)?)?
        }
        Commands::Narrative { user } => {
            print_json("Narrative", &user, &service.narrative(&user, as_of)?)?
        }
        Commands::Report { user } => print_json("Report", &user, &service.report(&user, as_of))?,
        Commands::PublishPeer { user, name } => {
            let name = name.unwrap_or_else(|| user.clone());
            let peer = service.publish_peer_vector(&user, &name, as_of)?;
            print_json("Published", &user, &peer)?
        }
    }

    Ok(())
}
