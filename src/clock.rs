//! # clock
//!
//! "What time is it, and is the market trading?"  Both the staleness check
//! and the refresh flag depend on the answer, so it sits behind a port that
//! tests can pin.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub trait MarketClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn is_market_open(&self) -> bool;
}

// ─── Exchange Session Clock ───────────────────────────────────────────────────

/// Wall clock with a weekday cash session in a fixed exchange offset.
///
/// Defaults to the NSE cash session: 09:15–15:30 IST (UTC+05:30), Mon–Fri.
/// Exchange holidays are not modelled; on those days a forced refresh simply
/// asks the server to recompute.
#[derive(Debug, Clone)]
pub struct SessionClock {
    offset: FixedOffset,
    open:   NaiveTime,
    close:  NaiveTime,
}

impl SessionClock {
    pub fn new(offset: FixedOffset, open: NaiveTime, close: NaiveTime) -> Self {
        Self { offset, open, close }
    }

    pub fn nse() -> Self {
        let ist = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or(Utc.fix());
        Self::new(
            ist,
            NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
        )
    }

    /// Whether `at` falls inside the session.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        let weekday = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let time = local.time();
        weekday && time >= self.open && time < self.close
    }
}

impl Default for SessionClock {
    fn default() -> Self { Self::nse() }
}

impl MarketClock for SessionClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_market_open(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}

// ─── Fixed Clock ──────────────────────────────────────────────────────────────

/// A clock frozen at one instant with a fixed open/closed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now:         DateTime<Utc>,
    pub market_open: bool,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, market_open: bool) -> Self {
        Self { now, market_open }
    }
}

impl MarketClock for FixedClock {
    fn now(&self) -> DateTime<Utc> { self.now }
    fn is_market_open(&self) -> bool { self.market_open }
}
