use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over `length` steps. Hidden unless `verbose`.
pub(crate) fn progress_bar(length: u64, message: &str, verbose: bool) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(length);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len} ({eta})")
            .progress_chars("#-"),
    );
    pb.set_message(message);
    pb
}
