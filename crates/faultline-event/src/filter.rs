use chrono::{DateTime, Utc};
use faultline_common::types::{AlertEvent, Severity};

/// Which lifecycle states a listing should include. Resolved events are
/// hidden unless a status filter explicitly requests them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Firing,
    Resolved,
    All,
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "firing" => Ok(StatusFilter::Firing),
            "resolved" => Ok(StatusFilter::Resolved),
            "all" => Ok(StatusFilter::All),
            _ => Err(format!("unknown status filter: {s}")),
        }
    }
}

/// Filters applied to an active-event listing before pagination.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub severity: Option<Severity>,
    pub first_trigger_gte: Option<DateTime<Utc>>,
    pub first_trigger_lte: Option<DateTime<Utc>>,
    /// Case-insensitive free-text match over rule name, annotations,
    /// fingerprint, datasource and label values.
    pub query: Option<String>,
    pub status: StatusFilter,
}

impl EventFilter {
    pub fn matches(&self, event: &AlertEvent) -> bool {
        match self.status {
            StatusFilter::Firing if event.resolved => return false,
            StatusFilter::Resolved if !event.resolved => return false,
            _ => {}
        }
        if self.severity.is_some_and(|sev| event.severity != sev) {
            return false;
        }
        if self
            .first_trigger_gte
            .is_some_and(|t| event.first_trigger_time < t)
        {
            return false;
        }
        if self
            .first_trigger_lte
            .is_some_and(|t| event.first_trigger_time > t)
        {
            return false;
        }
        if let Some(query) = &self.query {
            if !matches_query(event, query) {
                return false;
            }
        }
        true
    }
}

fn matches_query(event: &AlertEvent, query: &str) -> bool {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    event.rule_name.to_lowercase().contains(&needle)
        || event.annotations.to_lowercase().contains(&needle)
        || event.fingerprint.to_lowercase().contains(&needle)
        || event.datasource.to_lowercase().contains(&needle)
        || event
            .labels
            .values()
            .any(|v| v.to_lowercase().contains(&needle))
}

/// Filter and order a partition's events for listing: newest first by
/// first-trigger time, fingerprint ascending as the stable tie-break so
/// pagination never shuffles equal-keyed rows between pages.
pub fn apply(events: Vec<AlertEvent>, filter: &EventFilter) -> Vec<AlertEvent> {
    let mut filtered: Vec<AlertEvent> = events.into_iter().filter(|e| filter.matches(e)).collect();
    filtered.sort_by(|a, b| {
        b.first_trigger_time
            .cmp(&a.first_trigger_time)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    filtered
}

/// One page of an already-ordered listing.
pub fn page(events: &[AlertEvent], limit: u64, offset: u64) -> Vec<AlertEvent> {
    events
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}
