//! Neo4j-backed SNOMED CT concept index.
//!
//! Queries the full-text term index through the HTTP transactional commit
//! endpoint, so no bolt driver is required. Rows come back ordered by
//! descending relevance score; that ordering is trusted downstream.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::GraphConfig;
use crate::providers::ConceptIndex;
use crate::terminology::ConceptMatch;
use error_common::{EngineError, EngineResult};

const FULLTEXT_QUERY: &str = "\
CALL db.index.fulltext.queryNodes($index, $keyword) YIELD node, score \
RETURN node.conceptId AS conceptId, node.term AS term, \
node.semanticTag AS semanticTag, score \
ORDER BY score DESC LIMIT $limit";

pub struct Neo4jConceptIndex {
    http: reqwest::Client,
    config: GraphConfig,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl Neo4jConceptIndex {
    pub fn new(config: GraphConfig, timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.api_url.trim_end_matches('/'),
            self.config.database
        )
    }

    fn parse_row(row: &serde_json::Value) -> EngineResult<ConceptMatch> {
        let columns = row
            .as_array()
            .ok_or_else(|| EngineError::Schema("terminology row is not an array".into()))?;

        let concept_id = match columns.first() {
            // Concept identifiers are numeric in some SNOMED loads.
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => return Err(EngineError::Schema("terminology row missing conceptId".into())),
        };
        let term_label = columns
            .get(1)
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Schema("terminology row missing term".into()))?
            .to_string();
        let semantic_tag = columns
            .get(2)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let score = columns
            .get(3)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EngineError::Schema("terminology row missing score".into()))?;

        Ok(ConceptMatch {
            concept_id,
            term_label,
            semantic_tag,
            score,
        })
    }
}

#[async_trait]
impl ConceptIndex for Neo4jConceptIndex {
    async fn search(&self, keyword: &str) -> EngineResult<Vec<ConceptMatch>> {
        let payload = json!({
            "statements": [{
                "statement": FULLTEXT_QUERY,
                "parameters": {
                    "index": self.config.index_name,
                    "keyword": keyword,
                    "limit": self.config.fetch_limit,
                },
            }],
        });

        let response = self
            .http
            .post(self.commit_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream(
                "terminology",
                status.as_u16(),
                detail,
            ));
        }

        let body: TxResponse = response.json().await?;
        if let Some(error) = body.errors.first() {
            return Err(EngineError::upstream(
                "terminology",
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            ));
        }

        let rows: Vec<ConceptMatch> = body
            .results
            .iter()
            .flat_map(|result| result.data.iter())
            .map(|row| Self::parse_row(&row.row))
            .collect::<EngineResult<_>>()?;

        debug!(keyword = keyword, rows = rows.len(), "terminology query returned");
        Ok(rows)
    }
}
