//! ============================================================================
//! Passage Index - Qdrant vector search over pre-populated content
//! ============================================================================
//! The collection is filled out-of-band (backstory files, lore, etc.).
//! Each point's payload holds the passage text plus metadata, including the
//! source tag used to scope a query to one companion's content.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{value::Kind, Condition, Filter, SearchPointsBuilder, Value};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::types::Passage;

/// Vector index queried by recall
#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// Up to `top_k` passages tagged `source_tag`, best match first
    async fn query(&self, vector: Vec<f32>, top_k: u64, source_tag: &str) -> Result<Vec<Passage>>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Passage index backed by a Qdrant collection
pub struct QdrantPassageIndex {
    client: Qdrant,
    collection: String,
    text_field: String,
    source_field: String,
}

impl QdrantPassageIndex {
    /// Configure a client for `collection`. No request is made until the
    /// first query.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: String,
        text_field: String,
        source_field: String,
    ) -> Result<Self> {
        debug!("Configuring Qdrant client for {} ({})", url, collection);

        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        Ok(Self {
            client,
            collection,
            text_field,
            source_field,
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            config.collection.clone(),
            config.text_field.clone(),
            config.source_field.clone(),
        )
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Exact keyword match on the source field
    fn source_filter(&self, source_tag: &str) -> Filter {
        Filter::must([Condition::matches(
            self.source_field.clone(),
            source_tag.to_string(),
        )])
    }
}

#[async_trait]
impl PassageIndex for QdrantPassageIndex {
    async fn query(&self, vector: Vec<f32>, top_k: u64, source_tag: &str) -> Result<Vec<Passage>> {
        debug!(
            "Searching {} for source {} (limit: {})",
            self.collection, source_tag, top_k
        );

        let filter = self.source_filter(source_tag);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, top_k)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search passages: {}", e))?;

        let passages: Vec<Passage> = search_result
            .result
            .into_iter()
            .filter_map(|point| payload_to_passage(point.payload, &self.text_field))
            .collect();

        debug!("Found {} matching passages", passages.len());
        Ok(passages)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Split a point payload into passage text and remaining metadata.
/// Points without a string under `text_field` are skipped.
fn payload_to_passage(payload: HashMap<String, Value>, text_field: &str) -> Option<Passage> {
    let mut metadata: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(k, v)| (k, to_json(v)))
        .collect();

    let text = match metadata.remove(text_field) {
        Some(serde_json::Value::String(text)) => text,
        _ => {
            debug!("Skipping point without '{}' payload", text_field);
            return None;
        }
    };

    Some(Passage { text, metadata })
}

fn to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::condition::ConditionOneOf;
    use qdrant_client::qdrant::r#match::MatchValue;
    use qdrant_client::qdrant::{ListValue, Struct};

    #[test]
    fn test_payload_to_passage() {
        let payload: HashMap<String, Value> = [
            ("text".to_string(), Value::from("Aria grew up by the sea.".to_string())),
            ("fileName".to_string(), Value::from("aria.txt".to_string())),
            ("loc".to_string(), Value::from(12i64)),
        ]
        .into_iter()
        .collect();

        let passage = payload_to_passage(payload, "text").unwrap();
        assert_eq!(passage.text, "Aria grew up by the sea.");
        assert_eq!(passage.source_tag("fileName"), Some("aria.txt"));
        assert_eq!(passage.metadata.get("loc"), Some(&serde_json::json!(12)));
        assert!(!passage.metadata.contains_key("text"));
    }

    #[test]
    fn test_payload_without_text_is_skipped() {
        let payload: HashMap<String, Value> =
            [("fileName".to_string(), Value::from("aria.txt".to_string()))]
                .into_iter()
                .collect();

        assert!(payload_to_passage(payload, "text").is_none());
    }

    #[test]
    fn test_nested_values_convert() {
        let list = Value {
            kind: Some(Kind::ListValue(ListValue {
                values: vec![Value::from(true), Value::from(0.5)],
            })),
        };
        let nested = Value {
            kind: Some(Kind::StructValue(Struct {
                fields: [("fileName".to_string(), Value::from("aria.txt".to_string()))]
                    .into_iter()
                    .collect(),
            })),
        };

        assert_eq!(to_json(list), serde_json::json!([true, 0.5]));
        assert_eq!(to_json(nested), serde_json::json!({"fileName": "aria.txt"}));
        assert_eq!(to_json(Value { kind: None }), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_source_filter_matches_source_field_exactly() {
        let index = QdrantPassageIndex::new(
            "http://localhost:6334",
            None,
            "companions".to_string(),
            "text".to_string(),
            "metadata.fileName".to_string(),
        )
        .unwrap();

        let filter = index.source_filter("aria.txt");
        assert!(filter.should.is_empty());
        assert!(filter.must_not.is_empty());
        assert_eq!(filter.must.len(), 1);

        match &filter.must[0].condition_one_of {
            Some(ConditionOneOf::Field(field)) => {
                assert_eq!(field.key, "metadata.fileName");
                let value = field.r#match.as_ref().and_then(|m| m.match_value.as_ref());
                assert_eq!(value, Some(&MatchValue::Keyword("aria.txt".to_string())));
            }
            other => panic!("expected field condition, got {:?}", other),
        }
    }

    // Integration tests require a running Qdrant instance with a populated
    // collection. These are marked as ignored by default

    #[tokio::test]
    #[ignore]
    async fn test_query_live_collection() {
        let index = QdrantPassageIndex::new(
            "http://localhost:6334",
            None,
            "companions".to_string(),
            "text".to_string(),
            "fileName".to_string(),
        )
        .unwrap();

        assert!(index.health_check().await.unwrap());
        let passages = index.query(vec![0.0; 1536], 3, "aria.txt").await.unwrap();
        assert!(passages.len() <= 3);
    }
}
