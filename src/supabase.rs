//! Supabase (PostgREST) client for replicated questions and taxonomy tables.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SupabaseConfig;
use crate::filters::{FilterOption, LevelQuery};
use crate::schema::{QuestionPatch, QuestionRecord};
use crate::store::{QuestionStore, ResultsQuery, TaxonomyStore};

/// Supabase client configuration.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
    schema: String,
    results_table: String,
}

impl SupabaseClient {
    pub fn new(client: Client, config: &SupabaseConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            service_role_key: config.service_role_key.clone(),
            schema: config.schema.clone(),
            results_table: config.results_table.clone(),
        }
    }

    fn url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    /// Helper: GET from Supabase REST API.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .authorized(self.client.get(self.url(table)))
            .header("Accept-Profile", &self.schema)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Supabase GET {} unreachable", table))?;

        let resp = ensure_success(resp, "GET", table).await?;
        resp.json()
            .await
            .with_context(|| format!("Supabase GET {} returned unexpected body", table))
    }

    /// Helper: PATCH rows matching `params`, returning the updated rows.
    async fn patch_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
        body: &Value,
    ) -> Result<Vec<T>> {
        let resp = self
            .authorized(self.client.patch(self.url(table)))
            .header("Content-Type", "application/json")
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=representation")
            .query(params)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Supabase PATCH {} unreachable", table))?;

        let resp = ensure_success(resp, "PATCH", table).await?;
        resp.json()
            .await
            .with_context(|| format!("Supabase PATCH {} returned unexpected body", table))
    }

    fn row_scope(owner: &str, id: i64) -> Vec<(&'static str, String)> {
        vec![
            ("id", format!("eq.{}", id)),
            ("owner", format!("eq.{}", owner)),
            ("deleted", "eq.false".to_string()),
        ]
    }
}

async fn ensure_success(resp: Response, verb: &str, table: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Err(anyhow!("Supabase {} {} failed: {} - {}", verb, table, status, text))
}

/// PostgREST `or=(...)` filter matching `term` against the searchable columns.
/// LIKE wildcards in the term are escaped, then the pattern is double-quoted so
/// commas and parentheses are literal too.
fn search_filter(term: &str) -> String {
    let like = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let escaped = like.replace('\\', "\\\\").replace('"', "\\\"");
    let clauses: Vec<String> = ["question", "prompt", "solution"]
        .iter()
        .map(|column| format!("{}.ilike.\"*{}*\"", column, escaped))
        .collect();
    format!("({})", clauses.join(","))
}

#[async_trait::async_trait]
impl QuestionStore for SupabaseClient {
    async fn list_results(&self, query: &ResultsQuery) -> Result<Vec<QuestionRecord>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("owner", format!("eq.{}", query.owner)),
            ("deleted", "eq.false".to_string()),
            ("order", "job_id.desc,id.asc".to_string()),
        ];
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(("or", search_filter(term)));
        }

        let rows: Vec<QuestionRecord> = self.get_json(&self.results_table, &params).await?;
        debug!(
            "Fetched {} replicate rows for owner {}",
            rows.len(),
            query.owner
        );
        Ok(rows)
    }

    async fn update_result(
        &self,
        owner: &str,
        id: i64,
        patch: &QuestionPatch,
    ) -> Result<Option<QuestionRecord>> {
        let body = serde_json::to_value(patch).context("Failed to encode question patch")?;
        let rows: Vec<QuestionRecord> = self
            .patch_rows(&self.results_table, &Self::row_scope(owner, id), &body)
            .await?;

        if !rows.is_empty() {
            info!("Updated replicate row {} for owner {}", id, owner);
        }
        Ok(rows.into_iter().next())
    }

    async fn soft_delete_result(&self, owner: &str, id: i64) -> Result<bool> {
        let mut params = Self::row_scope(owner, id);
        params.push(("select", "id".to_string()));

        let rows: Vec<Value> = self
            .patch_rows(&self.results_table, &params, &json!({ "deleted": true }))
            .await?;

        if !rows.is_empty() {
            info!("Soft-deleted replicate row {} for owner {}", id, owner);
        }
        Ok(!rows.is_empty())
    }
}

#[async_trait::async_trait]
impl TaxonomyStore for SupabaseClient {
    async fn list_options(&self, query: &LevelQuery) -> Result<Vec<FilterOption>> {
        let mut params = vec![
            ("select", "id,name".to_string()),
            ("order", "name.asc".to_string()),
        ];
        if let Some((column, value)) = &query.parent {
            params.push((*column, format!("eq.{}", value)));
        }

        self.get_json(query.level.table(), &params).await
    }
}
