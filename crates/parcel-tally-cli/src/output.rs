use colored::*;
use parcel_tally_core::engine::{SessionDetail, SessionSummary};
use parcel_tally_core::storage::models::{DashboardStats, Item, RecentScan, Session};
use parcel_tally_core::{ScanOutcome, ScanStatus, SessionStats};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_outcome(outcome: &ScanOutcome) -> String {
    let status = match outcome.status {
        ScanStatus::Success => outcome.status.as_str().green().bold(),
        ScanStatus::Duplicate => outcome.status.as_str().yellow().bold(),
        ScanStatus::Invalid => outcome.status.as_str().red().bold(),
    };
    format!("{:<9} {}  {}", status, outcome.message, format_stats(&outcome.stats).dimmed())
}

pub fn format_stats(stats: &SessionStats) -> String {
    format!(
        "{}/{} scanned, {} missing, {}%",
        stats.scanned_count, stats.total, stats.missing_count, stats.progress
    )
}

fn colored_progress(stats: &SessionStats) -> ColoredString {
    let text = format!("{:>3}%", stats.progress);
    if stats.is_complete() {
        text.green()
    } else if stats.scanned_count > 0 {
        text.yellow()
    } else {
        text.normal()
    }
}

pub fn format_item(item: &Item) -> String {
    let status = if item.is_scanned() {
        item.status.as_str().green()
    } else {
        item.status.as_str().red()
    };
    let mut line = format!(
        "{:>6}  {:<24} {:<9}  {:<20} {}",
        item.id,
        item.tracking_id,
        status,
        item.recipient.as_deref().unwrap_or("-"),
        item.product_name.as_deref().unwrap_or("-"),
    );
    if let (Some(at), Some(by)) = (item.scanned_at, item.scanned_by.as_deref()) {
        line.push_str(&format!(
            "  {}",
            format!("{} by {}", at.format("%Y-%m-%d %H:%M:%S"), by).dimmed()
        ));
    }
    line
}

pub fn print_session(session: &Session) {
    let state = if session.is_active {
        "active".green()
    } else {
        "inactive".dimmed()
    };
    println!(
        "Session {} {} ({}, created by {} at {})",
        format!("#{}", session.id).cyan(),
        session.name.bold(),
        state,
        session.created_by,
        session.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
}

pub fn print_session_detail(detail: &SessionDetail, items: &[Item]) {
    print_session(&detail.session);
    println!("  {}", format_stats(&detail.stats));
    if items.is_empty() {
        println!("  {}", "no matching items".dimmed());
        return;
    }
    for item in items {
        println!("{}", format_item(item));
    }
}

pub fn print_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("{}", "No sessions".dimmed());
        return;
    }
    for summary in sessions {
        let session = &summary.session;
        println!(
            "{:>6}  {}  {:<32} {:>5}/{:<5} {}",
            session.id,
            colored_progress(&summary.stats),
            session.name,
            summary.stats.scanned_count,
            summary.stats.total,
            if session.is_active {
                "".normal()
            } else {
                "inactive".dimmed()
            },
        );
    }
}

pub fn print_dashboard(stats: &DashboardStats) {
    println!("Sessions created today : {}", format!("{}", stats.sessions_created).cyan());
    println!("Parcels scanned today  : {}", format!("{}", stats.scanned_since).cyan());
    println!("Active sessions        : {}", format!("{}", stats.active_sessions).cyan());
    println!("Overall progress       : {}", format!("{}%", stats.overall_progress).green());
}

pub fn print_recent(scans: &[RecentScan]) {
    if scans.is_empty() {
        println!("{}", "No scans yet".dimmed());
        return;
    }
    for scan in scans {
        println!(
            "{}  {:<24} {:<20} {:<16} {}",
            scan.scanned_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            scan.tracking_id,
            scan.product_name.as_deref().unwrap_or("-"),
            scan.scanned_by.as_deref().unwrap_or("-"),
            scan.session_name.cyan(),
        );
    }
}
