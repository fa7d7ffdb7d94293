//! Progress reporting for long-running stages, built on indicatif.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Create the progress bar for a pipeline stage.
#[must_use]
pub fn main_bar(length: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(length);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .expect("progress template is valid")
            .progress_chars("#>-"),
    );
    bar.set_message(message.to_string());
    bar
}

/// Finish a progress bar with a completion message.
pub fn finish(bar: &ProgressBar, message: &str) {
    bar.finish_with_message(message.to_string());
}
