use tracing::warn;

/// Number of whole frames closest to `duration_sec` at `refresh_hz`.
///
/// Non-positive refresh rates and negative durations yield 0 frames.
pub fn frames_for(duration_sec: f64, refresh_hz: f64) -> u32 {
    if !(refresh_hz > 0.0) || !refresh_hz.is_finite() {
        warn!(refresh_hz, "refresh rate must be positive, using 0 frames");
        return 0;
    }
    if !(duration_sec >= 0.0) || !duration_sec.is_finite() {
        warn!(duration_sec, "negative duration, using 0 frames");
        return 0;
    }
    let ideal = duration_sec * refresh_hz;
    if ideal >= u32::MAX as f64 {
        warn!(duration_sec, refresh_hz, "frame count saturated");
        return u32::MAX;
    }
    ideal.round() as u32
}
