//! HTTP client for the dataset entries bulk endpoint.
//!
//! One request per batch: `POST /datasets/{uuid}/entries/bulk` with the
//! entries in the request body, returning the number of created entries.
//!
//! # Logging
//!
//! Only HTTP method, path, entry counts, and status codes are logged; raw
//! cell data never is.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::transform::EntryRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the bulk create endpoint.
#[derive(Debug, Serialize)]
struct BulkCreateRequest<'a> {
    entries: &'a [EntryRecord],
}

/// Response from the bulk create endpoint.
#[derive(Debug, Deserialize)]
struct BulkCreateResponse {
    created: u64,
}

/// Backend error response format.
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkEntryClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for bulk entry creation against the dataset backend.
#[derive(Clone)]
pub struct BulkEntryClient {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// Base URL of the backend API.
    base_url: Url,
}

impl BulkEntryClient {
    /// Creates a new bulk entry client.
    pub fn new(client: Arc<Client>, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Uploads one batch of entries to a dataset.
    ///
    /// # Returns
    ///
    /// The number of entries the backend reports as created.
    ///
    /// # Errors
    ///
    /// - `AppError::ConnectionFailed` - transport-level failure
    /// - `AppError::BackendError` - non-success HTTP response
    pub async fn create_entries_bulk(
        &self,
        dataset_id: &Uuid,
        entries: &[EntryRecord],
    ) -> Result<u64, AppError> {
        let url = self.build_bulk_url(dataset_id)?;

        info!(
            "[BULK-UPLOAD] POST /datasets/{}/entries/bulk ({} entries)",
            dataset_id,
            entries.len()
        );

        let response = self
            .client
            .post(url)
            .json(&BulkCreateRequest { entries })
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Bulk create failed: {}", e)))?;

        let status = response.status();
        info!(
            "[BULK-UPLOAD] POST /datasets/{}/entries/bulk -> {}",
            dataset_id,
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let body: BulkCreateResponse = response.json().await.map_err(|e| {
            AppError::BackendError {
                status: status.as_u16(),
                message: format!("Failed to parse bulk create response: {}", e),
            }
        })?;

        Ok(body.created)
    }

    /// Builds the bulk endpoint URL: /datasets/{uuid}/entries/bulk
    fn build_bulk_url(&self, dataset_id: &Uuid) -> Result<Url, AppError> {
        let path = format!("datasets/{}/entries/bulk", dataset_id);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build bulk URL: {}", e)))
    }
}

/// Maps a non-success HTTP response onto [`AppError::BackendError`].
async fn parse_error_response(response: reqwest::Response, status: reqwest::StatusCode) -> AppError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    let message = serde_json::from_str::<BackendErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail.or(b.message))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    AppError::BackendError {
        status: status.as_u16(),
        message,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
