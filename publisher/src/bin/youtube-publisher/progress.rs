use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use youtube_publisher::{Progress, ProgressSink, UploadState};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

/// Renders upload progress as a terminal progress bar.
pub struct UploadBar {
    bar: ProgressBar,
}

impl UploadBar {
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Stops the bar, leaving it on screen if the upload failed.
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl ProgressSink for UploadBar {
    fn progress(&mut self, progress: Progress) {
        self.bar.set_position(progress.bytes_sent);
        match progress.state {
            UploadState::Pending => {}
            UploadState::InProgress => self.bar.set_message("uploading"),
            UploadState::Completed => self.bar.finish_with_message("done"),
            UploadState::Failed => self.bar.abandon_with_message("failed"),
        }
    }
}

/// A spinner for steps whose duration is unknown.
pub fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(message);
    spinner
}
