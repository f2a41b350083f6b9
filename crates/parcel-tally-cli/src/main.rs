mod commands;
mod logging;
mod manifest_csv;
mod output;
mod progress;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use parcel_tally_core::storage::models::{ItemFilter, ItemUpdate, SessionUpdate};
use parcel_tally_core::storage::Database;
use parcel_tally_core::{AppConfig, ManifestRecord, ScanEngine, TracingSink};
use progress::SessionProgress;
use tracing::{error, info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Returns instead of calling `process::exit` so the log guard is dropped
/// and the file writer flushes its last lines.
fn main() -> ExitCode {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match parcel_tally_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let args = Cli::parse();

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return ExitCode::SUCCESS;
    };

    match run(command, &config, args.json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn open_engine(config: &AppConfig) -> Result<ScanEngine, parcel_tally_core::Error> {
    Ok(ScanEngine::open(config)?.with_activity_sink(Arc::new(TracingSink)))
}

fn run(command: Commands, config: &AppConfig, json: bool) -> CliResult {
    match command {
        Commands::CreateSession {
            name,
            manifest,
            created_by,
        } => {
            let records = manifest_csv::read_manifest(&manifest)?;
            let engine = open_engine(config)?;
            let session = engine.create_session(&name, &records, &created_by)?;
            let stats = engine.session_stats(session.id)?;
            if json {
                output::print_json(&engine.get_session_detail(session.id)?)?;
            } else {
                output::print_session(&session);
                println!(
                    "  {} manifest items loaded",
                    format!("{}", stats.total).green()
                );
            }
        }
        Commands::Import { session, manifest } => {
            let records = manifest_csv::read_manifest(&manifest)?;
            let engine = open_engine(config)?;
            let added = engine.import_manifest(session, &records)?;
            let stats = engine.session_stats(session)?;
            if json {
                output::print_json(&stats)?;
            } else {
                println!(
                    "{} items added, {}",
                    format!("{}", added).green(),
                    output::format_stats(&stats)
                );
            }
        }
        Commands::AddItem {
            session,
            tracking_id,
            recipient,
            product,
        } => {
            let engine = open_engine(config)?;
            let record = ManifestRecord {
                tracking_id,
                recipient,
                product_name: product,
            };
            let item = engine.add_item(session, record)?;
            if json {
                output::print_json(&item)?;
            } else {
                println!("{}", output::format_item(&item));
            }
        }
        Commands::Scan {
            session,
            tracking_id,
            operator,
        } => {
            let engine = open_engine(config)?;
            match tracking_id {
                Some(code) => {
                    let outcome = engine.scan(session, &code, &operator)?;
                    if json {
                        output::print_json(&outcome)?;
                    } else {
                        println!("{}", output::format_outcome(&outcome));
                    }
                }
                None => run_scan_loop(&engine, session, &operator, json)?,
            }
        }
        Commands::Show {
            session,
            status,
            search,
        } => {
            let engine = open_engine(config)?;
            let detail = engine.get_session_detail(session)?;
            let filter = ItemFilter {
                status,
                query: search,
            };
            let items: Vec<_> = detail
                .items
                .iter()
                .filter(|item| filter.matches(item))
                .cloned()
                .collect();
            if json {
                output::print_json(&serde_json::json!({
                    "session": detail.session,
                    "items": items,
                    "stats": detail.stats,
                }))?;
            } else {
                output::print_session_detail(&detail, &items);
            }
        }
        Commands::List { active } => {
            let engine = open_engine(config)?;
            let sessions = engine.list_sessions(active)?;
            if json {
                output::print_json(&sessions)?;
            } else {
                output::print_sessions(&sessions);
            }
        }
        Commands::UpdateItem {
            item,
            tracking_id,
            recipient,
            product,
            status,
            scanned_at,
            scanned_by,
            actor,
        } => {
            let engine = open_engine(config)?;
            let update = ItemUpdate {
                tracking_id,
                recipient,
                product_name: product,
                status,
                scanned_at,
                scanned_by,
            };
            let item = engine.update_item(item, update, &actor)?;
            if json {
                output::print_json(&item)?;
            } else {
                println!("{}", output::format_item(&item));
            }
        }
        Commands::DeleteItem { item } => {
            let engine = open_engine(config)?;
            let deleted = engine.delete_item(item)?;
            let stats = engine.session_stats(deleted.session_id)?;
            if json {
                output::print_json(&stats)?;
            } else {
                println!(
                    "Deleted {} from session {}, {}",
                    deleted.tracking_id.red(),
                    deleted.session_id,
                    output::format_stats(&stats)
                );
            }
        }
        Commands::UpdateSession {
            session,
            name,
            active,
        } => {
            let engine = open_engine(config)?;
            let updated = engine.update_session(
                session,
                SessionUpdate {
                    name,
                    is_active: active,
                },
            )?;
            if json {
                output::print_json(&updated)?;
            } else {
                output::print_session(&updated);
            }
        }
        Commands::DeleteSession { session, yes } => {
            let engine = open_engine(config)?;
            let target = engine.get_session(session)?;
            let confirmed = yes
                || prompt_confirm(
                    &format!(
                        "Delete session #{} '{}' and its whole manifest?",
                        target.id, target.name
                    ),
                    Some(false),
                )?;
            if !confirmed {
                return Ok(());
            }
            engine.delete_session(session)?;
            println!("Session {} deleted", format!("#{}", session).cyan());
        }
        Commands::Reconcile { session } => {
            let engine = open_engine(config)?;
            let stats = engine.reconcile_stats(session)?;
            if json {
                output::print_json(&stats)?;
            } else {
                println!("{}", output::format_stats(&stats));
            }
        }
        Commands::Dashboard => {
            let engine = open_engine(config)?;
            let stats = engine.dashboard_stats(start_of_today())?;
            if json {
                output::print_json(&stats)?;
            } else {
                output::print_dashboard(&stats);
            }
        }
        Commands::Recent { limit } => {
            let engine = open_engine(config)?;
            let scans = engine.recent_activity(limit)?;
            if json {
                output::print_json(&scans)?;
            } else {
                output::print_recent(&scans);
            }
        }
        Commands::PrintConfig => {
            println!("Configuration: {:?}", config);
        }
        Commands::TruncateDb => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the Database?",
                Some(false),
            ) {
                Ok(true) => {
                    let db = Database::open(&config.database_path)?;
                    db.truncate_all()?;
                    println!("All tables truncated");
                }
                _ => return Ok(()),
            }
        }
    }

    Ok(())
}

/// Keyboard-wedge mode: one tracking id per line until EOF. A rejected line
/// is reported and the loop keeps going.
fn run_scan_loop(engine: &ScanEngine, session_id: i64, operator: &str, json: bool) -> CliResult {
    let session = engine.get_session(session_id)?;
    if !session.is_active {
        warn!(session_id, "Scanning into inactive session '{}'", session.name);
    }

    let mut last_stats = engine.session_stats(session_id)?;
    let bar = (!json).then(|| SessionProgress::new(&session.name, &last_stats));
    info!(session_id, operator, "Reading tracking ids from stdin");

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match engine.scan(session_id, &line, operator) {
            Ok(outcome) => {
                last_stats = outcome.stats;
                match &bar {
                    Some(bar) => {
                        bar.println(output::format_outcome(&outcome));
                        bar.update(&outcome.stats);
                    }
                    None => println!("{}", serde_json::to_string(&outcome)?),
                }
            }
            Err(err) if err.status_code() == 400 => match &bar {
                Some(bar) => bar.println(format!("{:<9} {}", "ERROR".red().bold(), err)),
                None => println!("{}", serde_json::json!({ "error": err.to_string() })),
            },
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(bar) = bar {
        bar.finish(&last_stats);
    }
    Ok(())
}

/// Midnight of the local calendar day, as UTC.
fn start_of_today() -> DateTime<Utc> {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() - Duration::hours(24))
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
