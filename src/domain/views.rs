//! View-count aggregation for public pages.

use std::collections::BTreeMap;

use time::{Date, format_description::FormatItem, macros::format_description};

const DAY_KEY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Lifetime total plus a per-day histogram keyed by `YYYY-MM-DD` (UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewCounts {
    pub total: u64,
    pub by_date: BTreeMap<String, u64>,
}

impl ViewCounts {
    pub fn new(total: u64, by_date: BTreeMap<String, u64>) -> Self {
        Self { total, by_date }
    }

    /// Record one view on `today`. Existing buckets are never dropped.
    pub fn bump(mut self, today: Date) -> Self {
        self.total = self.total.saturating_add(1);
        let bucket = self.by_date.entry(day_key(today)).or_insert(0);
        *bucket = bucket.saturating_add(1);
        self
    }

    pub fn reset(&mut self) {
        self.total = 0;
        self.by_date.clear();
    }
}

pub fn day_key(date: Date) -> String {
    date.format(DAY_KEY_FORMAT).unwrap_or_else(|_| {
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    })
}
