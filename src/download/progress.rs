//! Download progress parsing and reporting
//!
//! yt-dlp prints lines like `[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10`.
//! They are parsed into [`ProgressInfo`] and forwarded to the caller as short
//! percentage strings through a [`ProgressReporter`].

use std::sync::Arc;

/// Callback receiving human-readable percentages such as `"45%"`.
///
/// Invoked from the pipeline's own execution context (worker thread or task);
/// marshaling onto the caller's scheduler is the caller's job.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Parsed progress data from one extractor line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    pub percent: u8,
    pub speed_mbs: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub current_size: Option<u64>,
    pub total_size: Option<u64>,
}

/// Parses progress from yt-dlp output line
/// Example: "[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10"
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }

    let mut percent = None;
    let mut speed_mbs = None;
    let mut eta_seconds = None;
    let mut total_size = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') {
            if let Ok(p) = part.trim_end_matches('%').parse::<f32>() {
                // Clamp so garbage never jumps straight to 100%
                percent = Some(p.clamp(0.0, 100.0) as u8);
            }
        }

        // "of 10.00MiB" or "of ~ 10.00MiB"
        if *part == "of" {
            let next = parts.get(i + 1).copied();
            let candidate = if next == Some("~") { parts.get(i + 2).copied() } else { next };
            if let Some(size_bytes) = candidate.and_then(parse_size) {
                total_size = Some(size_bytes);
            }
        }

        if *part == "at" {
            if let Some(speed) = parts.get(i + 1).copied().and_then(parse_size) {
                speed_mbs = Some(speed as f64 / (1024.0 * 1024.0));
            }
        }

        if *part == "ETA" {
            if let Some(eta) = parts.get(i + 1).copied().and_then(parse_eta) {
                eta_seconds = Some(eta);
            }
        }
    }

    let p = percent?;
    let current_size = total_size.map(|total| (total as f64 * (p as f64 / 100.0)) as u64);

    Some(ProgressInfo {
        percent: p,
        speed_mbs,
        eta_seconds,
        current_size,
        total_size,
    })
}

/// Parses sizes like "10.00MiB", "500.00KiB", "1.2GiB", "900B" (optionally with "/s")
pub fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_start_matches('~').trim_end_matches("/s");
    let units: [(&str, f64); 4] = [
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("B", 1.0),
    ];
    units.iter().find_map(|(suffix, factor)| {
        size_str
            .strip_suffix(suffix)
            .and_then(|number| number.parse::<f64>().ok())
            .map(|value| (value * factor) as u64)
    })
}

/// Parses ETA strings like "00:10", "1:23" or "1:02:03"
pub fn parse_eta(eta_str: &str) -> Option<u64> {
    let parts: Vec<u64> = eta_str
        .split(':')
        .map(|p| p.parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [m, s] => Some(m * 60 + s),
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

/// Forwards percentages to an optional callback, skipping repeats.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_percent: Option<u8>,
    step: u8,
}

impl ProgressReporter {
    /// Reports every change.
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self::with_step(callback, 1)
    }

    /// Reports only when the value advanced by at least `step` points (100% is always reported).
    pub fn with_step(callback: Option<ProgressCallback>, step: u8) -> Self {
        Self {
            callback,
            last_percent: None,
            step: step.max(1),
        }
    }

    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        let due = match self.last_percent {
            None => true,
            Some(last) if percent == 100 => last != 100,
            Some(last) => percent >= last.saturating_add(self.step),
        };
        if !due {
            return;
        }
        self.last_percent = Some(percent);
        if let Some(ref callback) = self.callback {
            callback(&format!("{}%", percent));
        }
    }

    /// Feeds one extractor output line; non-progress lines are ignored.
    pub fn report_line(&mut self, line: &str) {
        if let Some(info) = parse_progress(line) {
            self.report(info.percent);
        }
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }
}
