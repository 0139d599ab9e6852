use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::transaction::RawTransaction;
use crate::sync::connection::BrokerConnection;

/// Result of one timeline fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFetch {
    pub run_id: Uuid,
    /// Items not present in the cache, newest first
    pub new_items: Vec<RawTransaction>,
    pub pages: usize,
    /// Set when a page request failed; `new_items` holds what arrived before it
    pub error: Option<String>,
}

impl TimelineFetch {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Paged timeline download with delta loading against a cached list.
pub struct TimelineFetcher {
    max_pages: usize,
}

impl TimelineFetcher {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    /// Walk the timeline from the newest page via `after` cursors.
    ///
    /// Stops at the first item whose id is already in `cached`, when the
    /// source returns no cursor or an empty page, or after `max_pages`.
    /// A failing page ends the walk; items collected so far are kept.
    pub async fn fetch(
        &self,
        connection: &BrokerConnection,
        cached: &[RawTransaction],
    ) -> TimelineFetch {
        let known: HashSet<&str> = cached.iter().filter_map(|t| t.id.as_deref()).collect();
        let mut fetch = TimelineFetch {
            run_id: Uuid::new_v4(),
            new_items: Vec::new(),
            pages: 0,
            error: None,
        };

        let mut after: Option<String> = None;
        'pages: while fetch.pages < self.max_pages {
            let page = match connection.timeline_page(after.take()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(run_id = %fetch.run_id, page = fetch.pages, error = %e, "timeline page failed, keeping partial result");
                    fetch.error = Some(e.to_string());
                    break;
                }
            };
            fetch.pages += 1;
            if page.items.is_empty() {
                break;
            }

            for item in page.items {
                if item.id.as_deref().is_some_and(|id| known.contains(id)) {
                    break 'pages;
                }
                fetch.new_items.push(item);
            }

            match page.after {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        info!(
            run_id = %fetch.run_id,
            pages = fetch.pages,
            new_items = fetch.new_items.len(),
            cached = cached.len(),
            "timeline fetch finished"
        );
        fetch
    }
}

impl Default for TimelineFetcher {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Merge freshly fetched items into a cached list.
///
/// De-duplicated by id (the fresh copy wins), sorted newest first. Items
/// without an id cannot be matched and are all kept.
pub fn merge_transactions(
    cached: &[RawTransaction],
    fresh: Vec<RawTransaction>,
) -> Vec<RawTransaction> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<RawTransaction> = Vec::with_capacity(cached.len() + fresh.len());

    for item in fresh.into_iter().chain(cached.iter().cloned()) {
        match item.id.as_deref() {
            Some(id) if !seen.insert(id.to_string()) => continue,
            _ => merged.push(item),
        }
    }

    merged.sort_by_key(|t| Reverse(t.parsed_timestamp()));
    merged
}
