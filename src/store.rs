//! Persistence seams used by the HTTP handlers.
//!
//! [`SupabaseClient`](crate::supabase::SupabaseClient) is the production
//! implementation; tests swap in an in-memory one.

use anyhow::Result;

use crate::filters::{FilterOption, LevelQuery};
use crate::schema::{QuestionPatch, QuestionRecord};

/// Owner-scoped listing of replicated questions.
#[derive(Debug, Clone, Default)]
pub struct ResultsQuery {
    pub owner: String,
    /// Case-insensitive match against question, prompt and solution text.
    pub search: Option<String>,
}

/// Access to the replicated-questions table.
///
/// Every call is scoped to an owner and ignores soft-deleted rows.
#[async_trait::async_trait]
pub trait QuestionStore: Send + Sync {
    /// Rows ordered by `job_id` descending, then `id` ascending.
    async fn list_results(&self, query: &ResultsQuery) -> Result<Vec<QuestionRecord>>;

    /// Returns the updated row, or `None` if nothing matched.
    async fn update_result(
        &self,
        owner: &str,
        id: i64,
        patch: &QuestionPatch,
    ) -> Result<Option<QuestionRecord>>;

    /// Returns false if nothing matched.
    async fn soft_delete_result(&self, owner: &str, id: i64) -> Result<bool>;
}

/// Access to the city/center/course/batch tables.
#[async_trait::async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn list_options(&self, query: &LevelQuery) -> Result<Vec<FilterOption>>;
}
