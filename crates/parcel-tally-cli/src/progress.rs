use indicatif::{ProgressBar, ProgressStyle};
use parcel_tally_core::SessionStats;

/// Session progress bar for the stdin scan loop. Scan results are printed
/// above the bar so it stays on the last line.
pub struct SessionProgress {
    bar: ProgressBar,
}

impl SessionProgress {
    pub fn new(session_name: &str, stats: &SessionStats) -> Self {
        let bar = ProgressBar::new(stats.total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} {prefix} [{bar:30.cyan/dim}] {pos}/{len} scanned {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.set_prefix(session_name.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));

        let progress = Self { bar };
        progress.update(stats);
        progress
    }

    pub fn update(&self, stats: &SessionStats) {
        if self.bar.length() != Some(stats.total as u64) {
            self.bar.set_length(stats.total as u64);
        }
        self.bar.set_position(stats.scanned_count as u64);
        self.bar
            .set_message(format!("({}%, {} missing)", stats.progress, stats.missing_count));
    }

    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    pub fn finish(&self, stats: &SessionStats) {
        self.bar.finish_and_clear();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} of {} scanned ({}%), {} missing",
            stats.scanned_count, stats.total, stats.progress, stats.missing_count
        );
    }
}
