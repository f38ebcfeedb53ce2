//! Service configuration.
//!
//! Everything comes from the environment (a `.env` file is loaded first when
//! present). Supabase credentials are required; the rest have defaults.

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::question_tree::LinkScope;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_RESULTS_TABLE: &str = "replicate_results";
const DEFAULT_PROCESS_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub supabase: SupabaseConfig,
    pub process_url: String,
    pub link_scope: LinkScope,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_role_key: String,
    /// Postgres schema sent as `Accept-Profile` / `Content-Profile`.
    pub schema: String,
    pub results_table: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests don't have to touch process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} not set", key))
        };
        let or_default = |key: &str, default: &str| {
            lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| {
                info!("{} not set, using default: {}", key, default);
                default.to_string()
            })
        };

        let link_scope = match lookup("LINK_SCOPE") {
            Some(raw) => LinkScope::parse(&raw).unwrap_or_else(|| {
                warn!("Invalid LINK_SCOPE '{}', falling back to 'job'", raw);
                LinkScope::Job
            }),
            None => LinkScope::Job,
        };

        Ok(Self {
            bind_addr: or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
            supabase: SupabaseConfig {
                base_url: required("SUPABASE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
                schema: or_default("SUPABASE_SCHEMA", DEFAULT_SCHEMA),
                results_table: or_default("RESULTS_TABLE", DEFAULT_RESULTS_TABLE),
            },
            process_url: or_default("PROCESS_URL", DEFAULT_PROCESS_URL)
                .trim_end_matches('/')
                .to_string(),
            link_scope,
        })
    }
}
