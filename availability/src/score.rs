//! Pack a refresh deadline and a reschedule counter into one sortable score.
//!
//! The schedule is a sorted set keyed by object, so both the next refresh time and the number
//! of consecutive natural refreshes must fit in a single `f64`. The deadline is stored as
//! milliseconds since the Unix epoch shifted left by 8 bits, and the low 8 bits hold the
//! counter:
//!
//! ```txt
//! | 63 ......................... 8 | 7 ...... 0 |
//! |   milliseconds since epoch     | reschedules|
//! ```
//!
//! Scores compare by deadline first, so a range query bounded by `encode(now, MAX_RESCHEDULES)`
//! returns every entry that is due regardless of its counter. The packed value stays exactly
//! representable as an `f64` while the deadline is below `2^45` milliseconds.

use commonware_utils::SystemTimeExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Largest reschedule counter that can be stored in a score.
pub const MAX_RESCHEDULES: u8 = u8::MAX;

/// Number of bits reserved for the reschedule counter.
const COUNTER_BITS: u32 = 8;

/// Encode `time` (truncated to milliseconds) and `reschedules` (clamped to
/// [MAX_RESCHEDULES]) into a score.
pub fn encode(time: SystemTime, reschedules: u32) -> f64 {
    let reschedules = reschedules.min(MAX_RESCHEDULES as u32) as u64;
    ((time.epoch_millis() << COUNTER_BITS) | reschedules) as f64
}

/// Decode a score produced by [encode].
pub fn decode(score: f64) -> (SystemTime, u8) {
    let packed = score as u64;
    let millis = packed >> COUNTER_BITS;
    let reschedules = (packed & MAX_RESCHEDULES as u64) as u8;
    (UNIX_EPOCH + Duration::from_millis(millis), reschedules)
}

/// Truncate `time` to millisecond precision.
pub fn truncate(time: SystemTime) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(time.epoch_millis())
}
