//! HTTP plumbing shared by the record and blob clients

use std::time::Duration;

use anyhow::Context;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use todo_sync_api::{Result, SyncError};
use tracing::{debug, error};

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Authenticated client for one Supabase project
#[derive(Clone)]
pub struct SupabaseHttp {
    base_url: String,
    client: reqwest::Client,
}

impl SupabaseHttp {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("Invalid API key format")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send a request and return the body of a successful response
    pub async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<Vec<u8>> {
        let response = request.send().await.map_err(|e| {
            let message = format_reqwest_error(&e, url, operation);
            error!("[SupabaseHttp] {}", message);
            if e.is_decode() {
                SyncError::decode(message)
            } else {
                SyncError::remote(operation, message)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            SyncError::remote(
                operation,
                format!("Failed to read response body from {}: {}", url, e),
            )
        })?;

        debug!(
            "[SupabaseHttp] {} {} -> {} ({} bytes)",
            operation,
            url,
            status.as_u16(),
            body.len()
        );

        if !status.is_success() {
            let message = format!(
                "HTTP {} error from {}: {}",
                status.as_u16(),
                url,
                truncate_body(&String::from_utf8_lossy(&body))
            );
            error!("[SupabaseHttp] {} failed: {}", operation, message);
            return Err(SyncError::remote(operation, message));
        }

        Ok(body.to_vec())
    }
}

/// Categorize a reqwest failure into an actionable message
fn format_reqwest_error(e: &reqwest::Error, url: &str, operation: &str) -> String {
    if e.is_timeout() {
        format!(
            "Failed to {} for {}: timeout - request took too long (check network or increase timeout_secs)",
            operation, url
        )
    } else if e.is_connect() {
        format!(
            "Failed to {} for {}: connection error - check network connectivity and the project URL. Error: {}",
            operation, url, e
        )
    } else if e.is_request() || e.is_builder() {
        format!(
            "Failed to {} for {}: request error - invalid URL or malformed request. Error: {}",
            operation, url, e
        )
    } else if e.is_decode() {
        format!(
            "Failed to {} for {}: decode error - unexpected response format from server. Error: {}",
            operation, url, e
        )
    } else {
        format!("Failed to {} for {}: {}. Debug details: {:?}", operation, url, e, e)
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY {
        let head: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    }
}
