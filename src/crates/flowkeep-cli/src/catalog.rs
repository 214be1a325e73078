//! Source catalog consulted by the drafting workflow
//!
//! The `lookup` node asks the catalog for a cached summary of the thread's
//! source URL; `fetch` asks it for fresh page text when the cached entry is
//! missing or stale; `summarize` records the new summary back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowkeep_core::routing::parse_timestamp;
use flowkeep_core::HandlerError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::config::SourceConfig;
use crate::error::{CliError, Result};

/// Cached summary of one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub url: String,
    pub summary: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Cached entry for `url`, if any
    async fn lookup(&self, url: &str) -> std::result::Result<Option<SourceRecord>, HandlerError>;

    /// Current page text for `url`
    async fn fetch(&self, url: &str) -> std::result::Result<String, HandlerError>;

    /// Remember a freshly produced summary
    async fn record(
        &self,
        url: &str,
        summary: &str,
        fetched_at: DateTime<Utc>,
    ) -> std::result::Result<(), HandlerError>;
}

/// In-process catalog seeded from configuration
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: RwLock<HashMap<String, SourceRecord>>,
    pages: HashMap<String, String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `[[sources]]`; a `fetched_at` of "NULL" or "" means never fetched
    pub fn from_sources(sources: &[SourceConfig]) -> Result<Self> {
        let mut catalog = Self::new();
        for source in sources {
            let fetched_at = match source.fetched_at.as_deref() {
                None => None,
                Some(raw) if raw.trim().is_empty() || raw.eq_ignore_ascii_case("null") => None,
                Some(raw) => Some(parse_timestamp(&Value::String(raw.to_string())).ok_or_else(
                    || CliError::SourceTimestamp {
                        url: source.url.clone(),
                        value: raw.to_string(),
                    },
                )?),
            };

            catalog = catalog.with_record(SourceRecord {
                url: source.url.clone(),
                summary: source.summary.clone(),
                fetched_at,
            });
            if let Some(content) = &source.content {
                catalog = catalog.with_page(&source.url, content);
            }
        }
        Ok(catalog)
    }

    pub fn with_record(self, record: SourceRecord) -> Self {
        self.records.write().insert(record.url.clone(), record);
        self
    }

    pub fn with_page(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.pages.insert(url.into(), content.into());
        self
    }

    pub fn record_for(&self, url: &str) -> Option<SourceRecord> {
        self.records.read().get(url).cloned()
    }
}

#[async_trait]
impl SourceCatalog for MemoryCatalog {
    async fn lookup(&self, url: &str) -> std::result::Result<Option<SourceRecord>, HandlerError> {
        Ok(self.record_for(url))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, HandlerError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no content available for {}", url).into())
    }

    async fn record(
        &self,
        url: &str,
        summary: &str,
        fetched_at: DateTime<Utc>,
    ) -> std::result::Result<(), HandlerError> {
        self.records.write().insert(
            url.to_string(),
            SourceRecord {
                url: url.to_string(),
                summary: Some(summary.to_string()),
                fetched_at: Some(fetched_at),
            },
        );
        Ok(())
    }
}
