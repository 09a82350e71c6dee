//! Filtering for the event explorer page.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::event::Event;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentFilter {
    #[default]
    All,
    Enriched,
    Unenriched,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    /// Case-insensitive substring matched against event type, user id and country.
    pub search: Option<String>,
    pub event_type: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub enrichment: EnrichmentFilter,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(needle) = non_empty(&self.search) {
            let needle = needle.to_lowercase();
            let hit = [
                Some(event.event_type.as_str()),
                event.user_id.as_deref(),
                event.country.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(event_type) = non_empty(&self.event_type) {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(country) = non_empty(&self.country) {
            if event.country.as_deref() != Some(country) {
                return false;
            }
        }
        match self.enrichment {
            EnrichmentFilter::All => true,
            EnrichmentFilter::Enriched => event.is_enriched,
            EnrichmentFilter::Unenriched => !event.is_enriched,
        }
    }
}

/// Blank values mean "no constraint".
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplorerPage {
    pub events: Vec<Event>,
    pub total: u64,
    pub enriched: u64,
    /// Distinct values over the unfiltered set, for the filter drop-downs.
    pub event_types: Vec<String>,
    pub countries: Vec<String>,
}

pub fn explore(events: Vec<Event>, filter: &EventFilter) -> ExplorerPage {
    let event_types = distinct(events.iter().map(|e| e.event_type.as_str()));
    let countries = distinct(events.iter().filter_map(|e| e.country.as_deref()));
    let matching: Vec<Event> = events.into_iter().filter(|e| filter.matches(e)).collect();
    ExplorerPage {
        total: matching.len() as u64,
        enriched: matching.iter().filter(|e| e.is_enriched).count() as u64,
        events: matching,
        event_types,
        countries,
    }
}

/// Distinct non-empty values in first-seen order.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}
