//! Exponential backoff with full jitter, shared by the durable-store retry
//! path (spec §7: `2^min(retry,5) + U(0,5)` seconds) and capped the same way
//! the renderer/registry retry helpers are (spec §9: cap at `2^5 + 5`).

use rand::Rng;
use std::time::Duration;

/// `2^min(retry, 5) + U(0, 5)` seconds, matching the original's
/// `get_exponential_backoff_delay`.
pub fn full_jitter_delay(retry: u32) -> Duration {
    let exp = 2f64.powi(retry.min(5) as i32);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..5.0);
    Duration::from_secs_f64(exp + jitter)
}
