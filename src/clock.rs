//! Bot clock
//!
//! Every timestamp the bot stores, compares or displays is normalized to a
//! single fixed civil zone (UTC+8, Philippine time). Durable rows keep unix
//! milliseconds, which are zone independent, and are converted back here.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};

/// Offset of the bot's civil zone in seconds
const UTC_PLUS_8_SECS: i32 = 8 * 3600;

/// The bot's fixed zone (UTC+8)
pub fn bot_timezone() -> FixedOffset {
    FixedOffset::east_opt(UTC_PLUS_8_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in the bot's zone
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&bot_timezone())
}

/// Normalize any timestamp into the bot's zone
pub fn normalize<Tz: TimeZone>(ts: DateTime<Tz>) -> DateTime<FixedOffset> {
    ts.with_timezone(&bot_timezone())
}

/// Convert stored unix milliseconds into the bot's zone
pub fn from_millis(millis: i64) -> DateTime<FixedOffset> {
    let utc = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
    normalize(utc)
}

/// Human-readable form used in messages, e.g. `October 17, 2026 • 09:30 PM GMT+8`
pub fn display(ts: &DateTime<FixedOffset>) -> String {
    normalize(*ts).format("%B %d, %Y • %I:%M %p GMT+8").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_utc_plus_8() {
        assert_eq!(now().offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_millis_roundtrip() {
        let ts = now();
        let back = from_millis(ts.timestamp_millis());
        assert_eq!(back.timestamp_millis(), ts.timestamp_millis());
        assert_eq!(back.offset(), ts.offset());
    }

    #[test]
    fn test_display_uses_local_wall_clock() {
        // 2024-01-01T00:00:00Z is 08:00 in UTC+8
        let utc = DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap();
        assert_eq!(display(&normalize(utc)), "January 01, 2024 • 08:00 AM GMT+8");
    }
}
