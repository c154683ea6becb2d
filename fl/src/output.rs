//! User-facing output for the non-batch commands.
//!
//! Batch commands report through `tracing`; `repo` and `plugins` print their
//! results here.
//!
//! ```rust,ignore
//! use fl::output::Output;
//!
//! let spinner = Output::spinner("Downloading default origins...");
//! spinner.finish_success("Wrote origins.txt");
//! Output::success("Queued 2 action(s)");
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::borrow::Cow;
use std::time::Duration;

pub struct Output;

impl Output {
    /// `✓ Queued 3 action(s)`
    pub fn success(msg: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), msg.as_ref());
    }

    /// `→ Nothing to do`
    pub fn info(msg: impl AsRef<str>) {
        println!("{} {}", "→".cyan(), msg.as_ref().dimmed());
    }

    /// `  • add-activate-package blur`
    pub fn step(msg: impl AsRef<str>) {
        println!("  {} {}", "•".cyan(), msg.as_ref());
    }

    pub fn subheader(msg: impl AsRef<str>) {
        println!("{}", msg.as_ref().bold());
    }

    pub fn list_item(msg: impl AsRef<str>) {
        println!("  {}", msg.as_ref());
    }

    /// Spinner that animates until one of the `finish_*` methods is called.
    pub fn spinner(msg: impl Into<Cow<'static, str>>) -> Spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(80));
        Spinner(pb)
    }
}

pub struct Spinner(ProgressBar);

impl Spinner {
    pub fn finish_success(self, msg: impl AsRef<str>) {
        self.0
            .finish_with_message(format!("{} {}", "✓".green().bold(), msg.as_ref()));
    }

    pub fn finish_error(self, msg: impl AsRef<str>) {
        self.0
            .finish_with_message(format!("{} {}", "✗".red().bold(), msg.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_methods_dont_panic() {
        Output::success("queued");
        Output::info("nothing to do");
        Output::step("remove-package blur");
        Output::subheader("PACKAGES:");
        Output::list_item("blur 1.0.0 https://example.invalid/blur.flres");
    }

    #[test]
    fn spinner_lifecycle() {
        Output::spinner("Downloading...").finish_success("Done");
        Output::spinner("Downloading...").finish_error("Failed");
    }
}
