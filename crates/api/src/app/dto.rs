use serde::{Deserialize, Serialize};

use campus_core::{DomainError, PageRequest, SortOrder};
use campus_infra::indexer::{TaskStats, WorkerStats};

// -------------------------
// Request DTOs
// -------------------------

/// `page`, `size`, repeatable `sort`, and (for search) `query`.
///
/// Read from raw pairs because `sort` may appear several times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub query: Option<String>,
    pub page: PageRequest,
}

impl ListParams {
    pub fn from_pairs(entity: &str, pairs: Vec<(String, String)>) -> Result<Self, DomainError> {
        let mut query = None;
        let mut page = None;
        let mut size = None;
        let mut sort = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "query" => query = Some(value),
                "page" => page = Some(parse_number(entity, "page", &value)?),
                "size" => size = Some(parse_number(entity, "size", &value)?),
                "sort" => sort.extend(SortOrder::parse(&value).unwrap_or_default()),
                _ => {}
            }
        }

        let mut page = PageRequest::new(page, size);
        page.sort = sort;
        Ok(Self { query, page })
    }
}

fn parse_number(entity: &str, name: &str, raw: &str) -> Result<u32, DomainError> {
    raw.trim().parse::<u32>().map_err(|_| {
        DomainError::validation(entity, "badpage", format!("Invalid {name} parameter: {raw}"))
    })
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct IndexStatsResponse {
    pub queue: TaskStats,
    pub worker: WorkerStats,
}

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub entity: &'static str,
    pub enqueued: u64,
}
