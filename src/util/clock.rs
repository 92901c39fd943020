//! Clock helpers bridging wall-clock timestamps and the monotonic scheduler clock.
//!
//! The scheduler keys every event on [`tokio::time::Instant`] so that tests can
//! pause and advance time deterministically. Absolute wall-clock targets (an
//! alarm at a given time of day) are converted once, at registration.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Convert a wall-clock target into a scheduler instant.
///
/// Targets already in the past map to "now" so they fire on the next tick.
pub fn instant_for(at: SystemTime) -> Instant {
    let now = Instant::now();
    match at.duration_since(SystemTime::now()) {
        Ok(ahead) => now.checked_add(ahead).unwrap_or_else(|| far_future(now)),
        Err(_) => now,
    }
}

/// An instant roughly thirty years ahead, used when a target overflows `Instant`.
pub(crate) fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86_400 * 365 * 30)
}

/// Time left until `at`, saturating at zero.
pub fn remaining(at: Instant) -> Duration {
    at.saturating_duration_since(Instant::now())
}

/// Wall-clock target for Unix seconds (fractional seconds allowed).
///
/// `None` for negative or non-finite values and for times `SystemTime`
/// cannot represent.
pub fn unix_secs_to_system_time(secs: f64) -> Option<SystemTime> {
    let offset = Duration::try_from_secs_f64(secs).ok()?;
    UNIX_EPOCH.checked_add(offset)
}
