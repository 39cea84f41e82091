//! Supabase (PostgREST) client.
//!
//! Thin HTTP wrapper for `/rest/v1/{table}`. Query building and response
//! parsing are pure functions for testability.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::{Direction, Filter, RemoteStore, SelectQuery, SelectResult};
use crate::config::{HttpTimeouts, SupabaseConfig};
use crate::error::NetworkError;

pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig, timeouts: HttpTimeouts) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| NetworkError::Permanent(format!("http client build failed: {e}")))?;
        Ok(Self { http, base_url: config.url.clone(), anon_key: config.anon_key.clone() })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, table: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let bearer = token.unwrap_or(&self.anon_key);
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<(HeaderMap, String), NetworkError> {
        let response = builder.send().await.map_err(|e| NetworkError::from_reqwest(&e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| NetworkError::from_reqwest(&e))?;
        if !(200..300).contains(&status) {
            return Err(NetworkError::from_status(status, &text));
        }
        Ok((headers, text))
    }
}

#[async_trait::async_trait]
impl RemoteStore for SupabaseStore {
    async fn select(&self, table: &str, query: &SelectQuery, token: Option<&str>) -> Result<SelectResult, NetworkError> {
        let mut builder = self.request(reqwest::Method::GET, table, token).query(&select_params(query));
        if query.count {
            builder = builder.header("Prefer", "count=exact");
        }
        let (headers, text) = Self::send(builder).await?;
        let rows = parse_rows(&text)?;
        let total_count = if query.count {
            headers
                .get("content-range")
                .and_then(|v: &HeaderValue| v.to_str().ok())
                .and_then(parse_content_range)
        } else {
            None
        };
        Ok(SelectResult { rows, total_count })
    }

    async fn insert(&self, table: &str, row: Value, token: Option<&str>) -> Result<Value, NetworkError> {
        let builder = self
            .request(reqwest::Method::POST, table, token)
            .header("Prefer", "return=representation")
            .json(&row);
        let (_, text) = Self::send(builder).await?;
        parse_rows(&text)?
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::Permanent(format!("insert into {table} returned no row")))
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, NetworkError> {
        let builder = self
            .request(reqwest::Method::PATCH, table, token)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let (_, text) = Self::send(builder).await?;
        parse_rows(&text)
    }
}

// =============================================================================
// QUERY BUILDING
// =============================================================================

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(|f| (f.column.clone(), format!("eq.{}", f.value))).collect()
}

fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_owned(), "*".to_owned())];
    params.extend(filter_params(&query.filters));
    if let Some((column, direction)) = &query.order {
        let dir = match direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        params.push(("order".to_owned(), format!("{column}.{dir}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_owned(), limit.to_string()));
    }
    params
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_rows(text: &str) -> Result<Vec<Value>, NetworkError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(NetworkError::Permanent(format!("unexpected response: {e}"))),
    }
}

/// Total from a `Content-Range` header such as `0-24/57` or `*/0`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
