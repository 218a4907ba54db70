// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::ports::ClockPort;

const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        SystemClock
    }
}

impl ClockPort for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// RFC 3339 text as stored in the job tables. Out-of-range years fall back
/// to the epoch so a write never fails on formatting.
pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| EPOCH_RFC3339.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_utc_timestamps() {
        assert_eq!(rfc3339(datetime!(2026-03-04 05:06:07 UTC)), "2026-03-04T05:06:07Z");
    }

    #[test]
    fn system_clock_is_utc() {
        assert!(SystemClock::new().now_utc().offset().is_utc());
    }
}
