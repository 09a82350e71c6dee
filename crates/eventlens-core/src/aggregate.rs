//! Dashboard statistics over an already-loaded event set.
//!
//! Everything here is a pure function of its inputs: no clock reads, no
//! shared state. "Today" is supplied by the caller so that a given input
//! always yields the same output. Calendar days are UTC days.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::event::Event;

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_TOP_EVENT_TYPES: usize = 6;
pub const DEFAULT_TOP_LOCATIONS: usize = 5;
/// Longest daily series produced; larger windows are clamped to it.
pub const MAX_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Clone)]
pub struct AggregationOptions {
    /// Last day of the daily series (inclusive), UTC.
    pub today: NaiveDate,
    pub window_days: u32,
    pub top_event_types: usize,
    pub top_locations: usize,
}

impl AggregationOptions {
    pub fn for_today(today: NaiveDate) -> Self {
        Self {
            today,
            window_days: DEFAULT_WINDOW_DAYS,
            top_event_types: DEFAULT_TOP_EVENT_TYPES,
            top_locations: DEFAULT_TOP_LOCATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    /// Short display label, e.g. `"Mar 01"`.
    pub label: String,
    pub events: u64,
    pub enriched: u64,
    pub enrichment_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
    /// Share of all events in the set, 0–100.
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_events: u64,
    pub enriched_events: u64,
    pub unique_users: u64,
    pub enrichment_rate: u32,
    /// Distinct countries in the whole set, not only the top entries.
    pub countries: u64,
    pub daily: Vec<DailyPoint>,
    pub top_event_types: Vec<RankedEntry>,
    pub top_countries: Vec<RankedEntry>,
}

pub fn compute(events: &[Event], options: &AggregationOptions) -> DashboardStats {
    let total_events = events.len() as u64;
    let enriched_events = events.iter().filter(|e| e.is_enriched).count() as u64;
    let unique_users = events
        .iter()
        .filter_map(|e| e.user_id.as_deref())
        .collect::<HashSet<_>>()
        .len() as u64;
    let countries = events
        .iter()
        .filter_map(|e| e.country.as_deref())
        .collect::<HashSet<_>>()
        .len() as u64;

    DashboardStats {
        total_events,
        enriched_events,
        unique_users,
        enrichment_rate: percentage(enriched_events, total_events),
        countries,
        daily: daily_series(events, options.today, options.window_days),
        top_event_types: top_k(
            events.iter().map(|e| e.event_type.as_str()),
            options.top_event_types,
            total_events,
        ),
        top_countries: top_k(
            events.iter().filter_map(|e| e.country.as_deref()),
            options.top_locations,
            total_events,
        ),
    }
}

/// `round(part / total * 100)` with halves rounded up; 0 when `total` is 0.
///
/// Integer arithmetic keeps results exact (1 of 8 is 12.5%, which rounds to 13).
pub fn percentage(part: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (part.saturating_mul(200) + total) / (2 * total);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// One point per UTC day for the `window_days` days ending on `today`,
/// oldest first. Days without events are present with zero counts.
///
/// The window is clamped to [`MAX_WINDOW_DAYS`]. A window reaching before the
/// earliest representable date yields an empty series.
pub fn daily_series(events: &[Event], today: NaiveDate, window_days: u32) -> Vec<DailyPoint> {
    let window_days = window_days.min(MAX_WINDOW_DAYS);
    if window_days == 0 {
        return Vec::new();
    }
    let Some(start) = today.checked_sub_signed(Duration::days(i64::from(window_days) - 1)) else {
        return Vec::new();
    };
    let mut buckets = vec![(0u64, 0u64); window_days as usize];

    for event in events {
        let offset = (event.timestamp.date_naive() - start).num_days();
        if offset < 0 || offset >= i64::from(window_days) {
            continue;
        }
        let bucket = &mut buckets[offset as usize];
        bucket.0 += 1;
        if event.is_enriched {
            bucket.1 += 1;
        }
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(idx, (events, enriched))| {
            let date = start + Duration::days(idx as i64);
            DailyPoint {
                date,
                label: date.format("%b %d").to_string(),
                events,
                enriched,
                enrichment_rate: percentage(enriched, events),
            }
        })
        .collect()
}

/// Count keys and keep the `k` most frequent.
///
/// Groups keep first-encountered order and the sort is stable, so keys with
/// equal counts rank in the order they first appeared.
pub fn top_k<'a, I>(keys: I, k: usize, total: u64) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: Vec<(&'a str, u64)> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for key in keys {
        match index.get(key) {
            Some(&pos) => groups[pos].1 += 1,
            None => {
                index.insert(key, groups.len());
                groups.push((key, 1));
            }
        }
    }

    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
        .into_iter()
        .take(k)
        .map(|(key, count)| RankedEntry {
            key: key.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect()
}
