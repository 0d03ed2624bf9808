use regex::Regex;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration: (\d+):(\d+):([\d.]+)").expect("invalid duration regex"));
// FFmpeg's `out_time_ms` key carries microseconds despite its name.
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^out_time_ms=(\d+)").expect("invalid time regex"));

/// Parse one line of FFmpeg output. Returns (fraction 0.0-1.0 or None, duration in seconds or None).
///
/// `Duration:` banner lines (stderr) only update the duration; `out_time_ms=` lines (the
/// `-progress pipe:1` stream) yield progress once a duration is known; `progress=end` is 1.0.
pub fn parse_ffmpeg_progress(
    line: &str,
    current_duration: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    let line = line.trim();

    if line == "progress=end" {
        return (Some(1.0), current_duration);
    }

    if let Some(caps) = DURATION_RE.captures(line) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        let minutes: f64 = caps[2].parse().unwrap_or(0.0);
        let seconds: f64 = caps[3].parse().unwrap_or(0.0);
        let duration = hours * 3600.0 + minutes * 60.0 + seconds;
        if duration > 0.0 {
            return (None, Some(duration));
        }
        return (None, current_duration);
    }

    if let Some(caps) = TIME_RE.captures(line)
        && let Some(dur) = current_duration.filter(|d| *d > 0.0)
    {
        let micros: u64 = caps[1].parse().unwrap_or(0);
        let elapsed = micros as f64 / 1_000_000.0;
        return (Some((elapsed / dur).clamp(0.0, 1.0)), Some(dur));
    }

    (None, current_duration)
}
