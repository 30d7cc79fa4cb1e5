//! Milvus REST (v2) vector store client

use super::{cap_per_reference, Candidate, VectorSearch, VectorStore, OUTPUT_FIELDS};
use macrolens_common::config::VectorStoreConfig;
use macrolens_common::errors::{AppError, Result};
use macrolens_common::upstream::{services, with_timeout};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Milvus collection searched over HTTP
pub struct MilvusStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    database: String,
    collection: String,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    db_name: &'a str,
    collection_name: &'a str,
    data: [&'a [f32]; 1],
    limit: usize,
    filter: &'a str,
    output_fields: &'a [&'a str],
    grouping_field: &'a str,
    group_size: usize,
    strict_group_size: bool,
    search_params: Value,
}

#[derive(Deserialize)]
struct SearchReply {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<Candidate>>,
}

impl MilvusStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            timeout: config.timeout(),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}{}", self.endpoint, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<Value> {
        let response = self
            .request(path)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::upstream(services::VECTOR_STORE, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                services::VECTOR_STORE,
                format!("API error {}: {}", status, body),
            ));
        }

        response.json().await.map_err(|e| {
            AppError::upstream(services::VECTOR_STORE, format!("Failed to parse response: {}", e))
        })
    }

    async fn run_search(&self, request: &VectorSearch<'_>) -> Result<Vec<Candidate>> {
        let body = SearchBody {
            db_name: &self.database,
            collection_name: &self.collection,
            data: [request.vector],
            limit: request.limit,
            filter: request.filter,
            output_fields: &OUTPUT_FIELDS,
            grouping_field: request.group_by_field,
            group_size: request.group_size,
            strict_group_size: false,
            search_params: serde_json::json!({ "metricType": "COSINE" }),
        };

        let reply = self.post("/v2/vectordb/entities/search", &body).await?;
        let candidates = parse_search_reply(reply)?;

        debug!(
            collection = %self.collection,
            hits = candidates.len(),
            "Vector search completed"
        );

        Ok(cap_per_reference(candidates, request.group_size))
    }
}

fn parse_search_reply(reply: Value) -> Result<Vec<Candidate>> {
    let reply: SearchReply = serde_json::from_value(reply).map_err(|e| {
        AppError::upstream(services::VECTOR_STORE, format!("Unexpected search reply: {}", e))
    })?;

    if reply.code != 0 {
        return Err(AppError::upstream(
            services::VECTOR_STORE,
            format!(
                "Search failed with code {}: {}",
                reply.code,
                reply.message.unwrap_or_default()
            ),
        ));
    }

    Ok(reply.data.unwrap_or_default())
}

#[async_trait::async_trait]
impl VectorStore for MilvusStore {
    async fn search(&self, request: &VectorSearch<'_>) -> Result<Vec<Candidate>> {
        with_timeout(services::VECTOR_STORE, self.timeout, self.run_search(request)).await
    }

    async fn health_check(&self) -> Result<()> {
        let body = serde_json::json!({
            "dbName": self.database,
            "collectionName": self.collection,
        });
        let reply = with_timeout(
            services::VECTOR_STORE,
            self.timeout,
            self.post("/v2/vectordb/collections/has", &body),
        )
        .await?;

        let exists = reply
            .pointer("/data/has")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if exists {
            Ok(())
        } else {
            Err(AppError::upstream(
                services::VECTOR_STORE,
                format!("Collection '{}' not found", self.collection),
            ))
        }
    }

    fn name(&self) -> &str {
        "milvus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_body_shape() {
        let vector = [0.1_f32, 0.2];
        let body = SearchBody {
            db_name: "default",
            collection_name: "economic_reports",
            data: [&vector],
            limit: 50,
            filter: "date == \"March 2024\"",
            output_fields: &OUTPUT_FIELDS,
            grouping_field: "reference",
            group_size: 4,
            strict_group_size: false,
            search_params: json!({ "metricType": "COSINE" }),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["collectionName"], "economic_reports");
        assert_eq!(value["groupingField"], "reference");
        assert_eq!(value["groupSize"], 4);
        assert_eq!(value["strictGroupSize"], false);
        assert_eq!(value["searchParams"]["metricType"], "COSINE");
        assert_eq!(value["data"][0].as_array().unwrap().len(), 2);
        assert_eq!(value["outputFields"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_parse_search_reply() {
        let reply = json!({
            "code": 0,
            "data": [{
                "id": 42,
                "distance": 0.83,
                "content": "Headline CPI inflation eased to 4.85 per cent",
                "source": "cpi_mar_2024.pdf",
                "page": 2,
                "reference": "CPI Press Release March 2024",
                "date": "March 2024"
            }]
        });

        let candidates = parse_search_reply(reply).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].page, "2");
        assert_eq!(candidates[0].date, "March 2024");
    }

    #[test]
    fn test_empty_reply_is_empty_pool() {
        assert!(parse_search_reply(json!({ "code": 0, "data": [] })).unwrap().is_empty());
        assert!(parse_search_reply(json!({ "code": 0 })).unwrap().is_empty());
    }

    #[test]
    fn test_error_code_is_upstream_error() {
        let reply = json!({ "code": 1100, "message": "collection not loaded" });
        assert!(matches!(
            parse_search_reply(reply),
            Err(AppError::Upstream { .. })
        ));
    }
}
