//! Daily schedule arithmetic

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone};

/// Next instant strictly after `now` at `hour`:00:00 local time
///
/// If today's slot has already started, the slot is tomorrow. On a daylight-saving
/// change the earliest valid mapping is used; an hour skipped by the change moves
/// to the first valid minute after it.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    loop {
        if let Some(slot) = date
            .and_hms_opt(hour.min(23), 0, 0)
            .and_then(|naive| resolve_local(&tz, naive))
        {
            if slot > *now {
                return slot;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => return now.clone(),
        }
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    // Gaps are at most a couple of hours wide
    (0..=180).find_map(|minutes| {
        tz.from_local_datetime(&(naive + ChronoDuration::minutes(minutes)))
            .earliest()
    })
}

/// Successive daily slots, each strictly after the previous one
///
/// The wait is measured on a monotonic clock while slots come from the wall clock.
/// If the wall clock steps back during a wait, the slot that was just served is
/// not scheduled a second time.
#[derive(Debug, Clone)]
pub struct DailySlots<Tz: TimeZone> {
    hour: u32,
    last: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> DailySlots<Tz> {
    pub fn new(hour: u32) -> Self {
        Self { hour, last: None }
    }

    /// Time to wait from `now` until the next slot not yet handed out
    pub fn next_delay(&mut self, now: &DateTime<Tz>) -> Duration {
        let from = match &self.last {
            Some(last) if last > now => last.clone(),
            _ => now.clone(),
        };
        let next = next_occurrence(&from, self.hour);
        let delay = next.clone()
            .signed_duration_since(now.clone())
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.last = Some(next);
        delay
    }
}
