//! Replicated question records and their API shapes.
//!
//! Rows come out of the `replicate_results` table flat; the API serves them
//! back as [`QuestionNode`] trees (see `question_tree`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A list column whose storage shape is not fixed: older writers stored a JSON
/// string (or a comma-joined string), newer ones a native array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredList {
    List(Vec<Value>),
    Text(String),
    /// Anything else a jsonb column can hold (object, number, bool).
    Other(Value),
}

/// One persisted row, exactly as the store returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(deserialize_with = "string_or_number")]
    pub job_id: String,
    #[serde(default)]
    pub paper_id: Option<Value>,
    #[serde(default)]
    pub question_id: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default)]
    pub options: Option<StoredList>,
    #[serde(default)]
    pub correct_ans: Option<String>,
    #[serde(default)]
    pub applied_edits: Option<StoredList>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Answer choices after normalization. `Raw` only survives when the stored
/// string was not a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionOptions {
    List(Vec<String>),
    Raw(String),
}

/// A question as served by the results endpoint, with its edit variants nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Value>,
    pub question: String,
    pub options: Option<QuestionOptions>,
    pub correct_ans: Option<String>,
    pub applied_edits: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub children: Vec<QuestionNode>,
}

/// Scalar fields a client may edit on an existing record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_ans: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

impl QuestionPatch {
    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.options.is_none()
            && self.correct_ans.is_none()
            && self.solution.is_none()
    }
}

/// A replication job to hand to the process service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateRequest {
    /// Correlation id; assigned server-side when the client leaves it out.
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub owner: String,
    pub paper_id: Value,
    pub question_ids: Vec<Value>,
    #[serde(default)]
    pub edits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

pub fn new_request_id() -> String {
    format!("rep_{}", Uuid::new_v4().simple())
}

/// What the process service reports back after accepting a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessJob {
    #[serde(deserialize_with = "string_or_number")]
    pub job_id: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn default_status() -> String {
    "queued".to_string()
}

/// Nullable columns come back as `null`, which `#[serde(default)]` alone rejects.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Job ids are bigints in some deployments and text in others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
