//! Progress rendering primitives and throttling state.
//!
//! The download tool reports progress as text; [`parse_progress_percent`]
//! extracts the `(NN%)` token from a single output line. Lines without the
//! token are ignored, they are never an error.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Default number of glyph positions in a progress bar
pub const BAR_LENGTH: usize = 20;

/// Upload progress must grow by more than this many points to be reported
pub const UPLOAD_REPORT_STEP: u8 = 5;

/// Match the aria2c summary percentage: `[#1c9b1b 20MiB/100MiB(20%) CN:1 DL:3.0MiB]`
static RE_PERCENT: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\((\d{1,3})%\)");

const FILLED: char = '█';
const EMPTY: char = '░';

/// Render `percent` into a bar of `bar_length` glyphs.
///
/// `floor(bar_length * percent / 100)` positions are filled; values above 100
/// are clamped.
///
/// # Examples
///
/// ```
/// use terabox_courier::job::progress::progress_bar;
/// assert_eq!(progress_bar(50, 4), "██░░");
/// ```
#[must_use]
pub fn progress_bar(percent: u8, bar_length: usize) -> String {
    let percent = usize::from(percent.min(100));
    let filled = bar_length * percent / 100;
    let mut bar = String::with_capacity(bar_length * FILLED.len_utf8());
    bar.extend(std::iter::repeat_n(FILLED, filled));
    bar.extend(std::iter::repeat_n(EMPTY, bar_length - filled));
    bar
}

/// Format a byte count with binary units and two decimals.
///
/// # Examples
///
/// ```
/// use terabox_courier::job::progress::human_readable_size;
/// assert_eq!(human_readable_size(1536), "1.50 KB");
/// ```
#[must_use]
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

/// Extract the percentage token from one line of download tool output.
///
/// Returns `None` when the line has no `(NN%)` token. Values are clamped to 100.
#[must_use]
pub fn parse_progress_percent(line: &str) -> Option<u8> {
    RE_PERCENT
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map(|p| u8::try_from(p.min(100)).unwrap_or(100))
}

/// Integer percentage of `done` over `total`; an empty total counts as complete.
#[must_use]
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(done) * 100 / u128::from(total)).min(100);
    u8::try_from(pct).unwrap_or(100)
}

/// Last reported percentages for one job.
///
/// Used only to suppress redundant status edits. Both values only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    download: u8,
    upload: u8,
}

impl ProgressTracker {
    /// Fresh tracker with both stages at 0%
    #[must_use]
    pub const fn new() -> Self {
        Self {
            download: 0,
            upload: 0,
        }
    }

    /// Record a download percentage; `true` when it should be reported.
    ///
    /// Any strict increase is reported.
    pub fn record_download(&mut self, percent: u8) -> bool {
        if percent > self.download {
            self.download = percent;
            true
        } else {
            false
        }
    }

    /// Record an upload percentage; `true` when it should be reported.
    ///
    /// Reports an increase of more than [`UPLOAD_REPORT_STEP`] points, or the
    /// first time 100 is reached.
    pub fn record_upload(&mut self, percent: u8) -> bool {
        let jumped = percent > self.upload.saturating_add(UPLOAD_REPORT_STEP);
        let completed = percent == 100 && self.upload < 100;
        if jumped || completed {
            self.upload = percent;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bar_edges() {
        assert_eq!(progress_bar(0, BAR_LENGTH), "░".repeat(20));
        assert_eq!(progress_bar(100, BAR_LENGTH), "█".repeat(20));
        assert_eq!(progress_bar(99, 20).chars().filter(|c| *c == '█').count(), 19);
        assert_eq!(progress_bar(250, 10), "█".repeat(10));
    }

    #[test]
    fn size_units() {
        assert_eq!(human_readable_size(0), "0.00 B");
        assert_eq!(human_readable_size(1023), "1023.00 B");
        assert_eq!(human_readable_size(1024), "1.00 KB");
        assert_eq!(human_readable_size(500 * 1024 * 1024), "500.00 MB");
        assert_eq!(human_readable_size(1900 * 1024 * 1024), "1.86 GB");
    }

    #[test]
    fn parses_aria2c_summary_line() {
        let line = "[#1c9b1b 20MiB/100MiB(20%) CN:1 DL:3.0MiB]";
        assert_eq!(parse_progress_percent(line), Some(20));
        assert_eq!(parse_progress_percent("[#2 0B/0B CN:1 DL:0B]"), None);
        assert_eq!(parse_progress_percent("Download complete: /x/y"), None);
        assert_eq!(parse_progress_percent("(100%)"), Some(100));
    }

    #[test]
    fn download_reports_every_increase() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.record_download(1));
        assert!(tracker.record_download(2));
        assert!(!tracker.record_download(2));
        assert!(!tracker.record_download(1));
        assert!(tracker.record_download(50));
        assert_eq!(tracker.download, 50);
    }

    #[test]
    fn upload_is_throttled_to_more_than_five_points() {
        let mut tracker = ProgressTracker::new();
        assert!(!tracker.record_upload(3));
        assert!(!tracker.record_upload(5));
        assert!(tracker.record_upload(6));
        assert!(!tracker.record_upload(11));
        assert!(tracker.record_upload(12));
        assert!(tracker.record_upload(97));
        // Completion is always reported once
        assert!(tracker.record_upload(100));
        assert!(!tracker.record_upload(100));
        assert_eq!(tracker.upload, 100);
    }

    #[test]
    fn percent_of_handles_empty_total() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(5, 4), 100);
    }

    proptest! {
        #[test]
        fn bar_has_fixed_width(percent in 0u8..=100, len in 1usize..64) {
            let bar = progress_bar(percent, len);
            let filled = bar.chars().filter(|c| *c == FILLED).count();
            let empty = bar.chars().filter(|c| *c == EMPTY).count();
            prop_assert_eq!(filled + empty, len);
            prop_assert_eq!(bar.chars().count(), len);
            prop_assert_eq!(filled, len * usize::from(percent) / 100);
        }

        #[test]
        fn size_is_reduced_below_1024_or_largest_unit(bytes in any::<u64>()) {
            let formatted = human_readable_size(bytes);
            let (number, unit) = formatted
                .split_once(' ')
                .ok_or_else(|| TestCaseError::fail("missing unit"))?;
            let decimals = number.split_once('.').map(|(_, d)| d.len());
            prop_assert_eq!(decimals, Some(2));
            let value: f64 = number
                .parse()
                .map_err(|_| TestCaseError::fail("not a number"))?;
            // Two-decimal rounding can print 1023.999 as 1024.00
            prop_assert!(value <= 1024.0 || unit == "TB");
        }

        #[test]
        fn download_tracker_is_monotonic(values in proptest::collection::vec(0u8..=100, 0..50)) {
            let mut tracker = ProgressTracker::new();
            let mut last = 0;
            for v in values {
                let reported = tracker.record_download(v);
                prop_assert_eq!(reported, v > last);
                prop_assert!(tracker.download >= last);
                last = tracker.download;
            }
        }
    }
}
