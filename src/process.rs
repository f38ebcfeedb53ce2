//! Client for the external question-generation ("process") service.
//!
//! The service owns generation; this side only validates and forwards a job
//! and reports back what the service accepted.

use anyhow::{Context, Result};
use tracing::info;

use crate::schema::{ProcessJob, ReplicateRequest};

pub struct ProcessClient {
    url: String,
    client: reqwest::Client,
}

impl ProcessClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// Forward a replication job. Non-2xx answers are errors.
    pub async fn submit(&self, request: &ReplicateRequest) -> Result<ProcessJob> {
        info!(
            "Submitting replicate job {} ({} questions, {} edits) for owner {}",
            request.request_id,
            request.question_ids.len(),
            request.edits.len(),
            request.owner
        );

        let response = self
            .client
            .post(format!("{}/replicate", self.url))
            .header("X-Request-Id", &request.request_id)
            .json(request)
            .send()
            .await
            .context("Process service unreachable")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Process service error ({}): {}", status, error_text);
        }

        let mut job: ProcessJob = response
            .json()
            .await
            .context("Process service returned unexpected body")?;
        if job.request_id.is_none() {
            job.request_id = Some(request.request_id.clone());
        }

        info!("Process service accepted job {} ({})", job.job_id, job.status);
        Ok(job)
    }
}

/// Reject requests the process service would only fail on later.
pub fn validate(request: &ReplicateRequest) -> Result<(), String> {
    if request.owner.trim().is_empty() {
        return Err("owner is required".to_string());
    }
    if request.question_ids.is_empty() {
        return Err("question_ids must not be empty".to_string());
    }
    Ok(())
}
