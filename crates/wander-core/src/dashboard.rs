//! Keyed cache for dashboard overview queries.
//!
//! Memoizes `(user, year)` overview responses so tab switches and repeat
//! visits don't refetch. There is no TTL: the cache only empties via
//! [`DashboardCache::clear`], which any collaborator mutating
//! dashboard-affecting data (trips, stages) must call.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;

#[derive(Default)]
struct CacheInner {
    entries: HashMap<(String, String), Value>,
    available_years: Vec<i32>,
}

/// Cache over the dashboard overview endpoint.
#[derive(Default)]
pub struct DashboardCache {
    inner: Mutex<CacheInner>,
}

impl DashboardCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the overview for `(user, year)`, serving repeats from cache.
    ///
    /// `None` falls back to "me" / all years. Only successful responses are
    /// cached; a failed fetch is retried on the next call with the same key.
    pub async fn overview(
        &self,
        client: &ApiClient,
        user_id: Option<u64>,
        year: Option<i32>,
    ) -> Result<Value, ApiError> {
        let key = (
            user_id.map_or_else(|| "me".to_string(), |id| id.to_string()),
            year.map_or_else(|| "all".to_string(), |y| y.to_string()),
        );

        if let Some(hit) = self.inner.lock().unwrap().entries.get(&key).cloned() {
            tracing::debug!(user = %key.0, year = %key.1, "dashboard overview cache hit");
            return Ok(hit);
        }

        let mut path = match user_id {
            Some(id) => format!("/api/dashboard/overview/{id}/"),
            None => "/api/dashboard/overview/".to_string(),
        };
        if let Some(y) = year {
            path.push_str(&format!("?year={y}"));
        }

        let body = client.send(ApiRequest::get(path)).await?.body;

        let mut inner = self.inner.lock().unwrap();
        if let Some(years) = body.get("available_years").and_then(Value::as_array) {
            inner.available_years = years
                .iter()
                .filter_map(Value::as_i64)
                .map(|y| y as i32)
                .collect();
        }
        inner.entries.insert(key, body.clone());
        Ok(body)
    }

    /// Years with data, as reported by the most recent overview response.
    pub fn available_years(&self) -> Vec<i32> {
        self.inner.lock().unwrap().available_years.clone()
    }

    /// Empties the entire cache. The only invalidation mechanism.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        let dropped = inner.entries.len();
        inner.entries.clear();
        tracing::debug!(dropped, "dashboard cache cleared");
    }
}
