use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

const BAR_CHARS: &str = "#>-";

fn ingest_spinner(input: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .expect("Failed to create progress style")
    );
    pb.set_prefix(input.to_string());
    pb.set_message("reading rows...");
    pb
}

/// Progress for one ingest input. Plain files get a byte bar against their
/// size; gzip input has no meaningful total, so it gets a spinner
pub fn create_ingest_progress(input: &str) -> ProgressBar {
    let size = std::fs::metadata(input).map(|meta| meta.len());
    let compressed = Path::new(input)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

    match size {
        Ok(total_bytes) if !compressed => {
            let pb = ProgressBar::new(total_bytes);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
                    .expect("Failed to create progress style")
                    .progress_chars(BAR_CHARS)
            );
            pb.set_prefix(input.to_string());
            pb
        }
        _ => ingest_spinner(input),
    }
}

/// Relinking pass over stored papers, total known up front
pub fn create_relink_progress(total_papers: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_papers);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] relinking [{bar:40.cyan/blue}] {pos}/{len} papers ({percent}%) {msg}")
            .expect("Failed to create progress style")
            .progress_chars(BAR_CHARS)
    );
    pb
}
