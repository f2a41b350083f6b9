use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use parcel_tally_core::storage::models::ItemStatus;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "parcel-tally")]
#[command(about = "Reconcile parcel scans against shipment manifests", long_about = None)]
pub struct Cli {
    /// Print results as JSON instead of coloured text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a scanning session from a CSV manifest
    CreateSession {
        /// Session name shown to operators
        #[arg(long)]
        name: String,
        /// CSV file with a tracking_id column and optional recipient, product_name
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value = "admin")]
        created_by: String,
    },
    /// Append a CSV manifest to an existing session
    Import {
        session: i64,
        manifest: PathBuf,
    },
    /// Add a single item to a session's manifest
    AddItem {
        session: i64,
        tracking_id: String,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        product: Option<String>,
    },
    /// Scan one tracking id, or read one per line from stdin
    Scan {
        session: i64,
        tracking_id: Option<String>,
        #[arg(long, default_value = "operator")]
        operator: String,
    },
    /// Show a session with its items and progress
    Show {
        session: i64,
        /// Only items with this status (scanned, unscanned)
        #[arg(long)]
        status: Option<ItemStatus>,
        /// Case-insensitive search in tracking id, recipient and product
        #[arg(long)]
        search: Option<String>,
    },
    /// List sessions, newest first
    List {
        /// Only active sessions
        #[arg(long)]
        active: bool,
    },
    /// Edit an item; an empty string clears recipient or product
    UpdateItem {
        item: i64,
        #[arg(long)]
        tracking_id: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        status: Option<ItemStatus>,
        /// RFC 3339 scan time to record instead of now (scanned items only)
        #[arg(long)]
        scanned_at: Option<DateTime<Utc>>,
        /// Operator to record instead of the acting admin (scanned items only)
        #[arg(long)]
        scanned_by: Option<String>,
        #[arg(long, default_value = "admin")]
        actor: String,
    },
    /// Remove an item from its session's manifest
    DeleteItem {
        item: i64,
    },
    /// Rename a session or change whether it is active
    UpdateSession {
        session: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a session and its whole manifest
    DeleteSession {
        session: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Recount a session from its items and repair cached counters
    Reconcile {
        session: i64,
    },
    /// Today's totals across all sessions
    Dashboard,
    /// Most recent scans across all sessions
    Recent {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_with_global_json() {
        let cli = Cli::parse_from([
            "parcel-tally",
            "scan",
            "3",
            "1Z999",
            "--operator",
            "op-7",
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Some(Commands::Scan {
                session,
                tracking_id,
                operator,
            }) => {
                assert_eq!(session, 3);
                assert_eq!(tracking_id.as_deref(), Some("1Z999"));
                assert_eq!(operator, "op-7");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_item_provenance() {
        let cli = Cli::parse_from([
            "parcel-tally",
            "update-item",
            "9",
            "--status",
            "SCANNED",
            "--scanned-at",
            "2024-05-01T08:30:00Z",
            "--scanned-by",
            "op-night",
        ]);
        match cli.command {
            Some(Commands::UpdateItem {
                item,
                status,
                scanned_at,
                scanned_by,
                ..
            }) => {
                assert_eq!(item, 9);
                assert_eq!(status, Some(ItemStatus::Scanned));
                assert_eq!(
                    scanned_at.map(|at| at.to_rfc3339()),
                    Some("2024-05-01T08:30:00+00:00".to_string())
                );
                assert_eq!(scanned_by.as_deref(), Some("op-night"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_status_filter() {
        let cli = Cli::parse_from(["parcel-tally", "show", "1", "--status", "scanned"]);
        match cli.command {
            Some(Commands::Show { status, .. }) => assert_eq!(status, Some(ItemStatus::Scanned)),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
