//! Elasticsearch-compatible index adapter
//!
//! Documents are stored under their record id. Root mutations run as painless
//! scripts through `_update_by_query`, so concurrent appends to the same root
//! are serialized by the search cluster rather than overwriting each other.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ClusterDocument, IndexError, IndexResult, IndexStore};
use crate::models::{ClusterId, RecordId};

const PAGE_SIZE: usize = 500;

const APPEND_SCRIPT: &str = r#"
for (def c : params.children) {
  if (c == ctx._source.record_id) { continue; }
  boolean present = false;
  for (def e : ctx._source.children) { if (e == c) { present = true; } }
  if (!present) { ctx._source.children.add(c); }
}
for (def n : params.names) {
  if (!ctx._source.suggest.contains(n)) { ctx._source.suggest.add(n); }
}
"#;

const REMOVE_CHILD_SCRIPT: &str = "ctx._source.children.removeIf(e -> e == params.child)";

const SET_PARENT_SCRIPT: &str = r#"
ctx._source.relation = ['name': 'child', 'parent': params.parent];
ctx._source.cluster_id = null;
"#;

/// HTTP client for one canonical index
pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: ClusterDocument,
    #[serde(default)]
    sort: Option<Vec<Value>>,
}

impl ElasticIndex {
    /// Create a client; every request fails with `IndexError::Timeout` after `timeout`
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.index, path)
    }

    /// Create the index with its mapping if it does not exist yet
    pub async fn ensure_index(&self) -> IndexResult<()> {
        let url = format!("{}/{}", self.base_url, self.index);
        let response = self.client.head(&url).send().await.map_err(map_transport)?;
        if response.status().is_success() {
            return Ok(());
        }

        let mapping = json!({
            "mappings": {
                "properties": {
                    "record_id": { "type": "long" },
                    "dataset": { "type": "keyword" },
                    "title": { "type": "text" },
                    "cluster_id": { "type": "long" },
                    "relation": {
                        "properties": {
                            "name": { "type": "keyword" },
                            "parent": { "type": "long" }
                        }
                    },
                    "children": { "type": "long" },
                    "suggest": { "type": "keyword" },
                    "names": { "type": "keyword" }
                }
            }
        });
        self.send(Method::PUT, &url, Some(mapping)).await?;
        tracing::info!(index = %self.index, "Created index");
        Ok(())
    }

    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> IndexResult<Value> {
        debug!(%method, url, "Index request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| IndexError::Malformed(e.to_string()))
    }

    async fn update_root(&self, cluster_id: ClusterId, script: &str, params: Value) -> IndexResult<()> {
        let body = json!({
            "query": root_query(cluster_id),
            "script": { "lang": "painless", "source": script, "params": params }
        });
        let result = self
            .send(Method::POST, &self.url("_update_by_query?refresh=true"), Some(body))
            .await?;

        if result["updated"].as_u64().unwrap_or(0) == 0 {
            return Err(IndexError::Missing(format!("root of cluster {}", cluster_id)));
        }
        Ok(())
    }

    async fn search_one(&self, query: Value) -> IndexResult<Option<ClusterDocument>> {
        let body = json!({ "size": 1, "query": query });
        let value = self.send(Method::POST, &self.url("_search"), Some(body)).await?;
        let response: SearchResponse =
            serde_json::from_value(value).map_err(|e| IndexError::Malformed(e.to_string()))?;
        Ok(response.hits.hits.into_iter().next().map(|h| h.source))
    }

    /// Page through every match ordered by record id
    async fn search_all(&self, query: Value) -> IndexResult<Vec<ClusterDocument>> {
        let mut documents = Vec::new();
        let mut search_after: Option<Vec<Value>> = None;

        loop {
            let mut body = json!({
                "size": PAGE_SIZE,
                "query": query,
                "sort": [{ "record_id": "asc" }]
            });
            if let Some(after) = &search_after {
                body["search_after"] = json!(after);
            }

            let value = self.send(Method::POST, &self.url("_search"), Some(body)).await?;
            let response: SearchResponse =
                serde_json::from_value(value).map_err(|e| IndexError::Malformed(e.to_string()))?;

            let page_len = response.hits.hits.len();
            for hit in response.hits.hits {
                search_after = hit.sort.clone();
                documents.push(hit.source);
            }

            if page_len < PAGE_SIZE || search_after.is_none() {
                break;
            }
        }

        Ok(documents)
    }
}

fn root_query(cluster_id: ClusterId) -> Value {
    json!({
        "bool": {
            "filter": [
                { "term": { "cluster_id": cluster_id } },
                { "term": { "relation.name": "parent" } }
            ]
        }
    })
}

fn map_transport(err: reqwest::Error) -> IndexError {
    if err.is_timeout() {
        IndexError::Timeout(err.to_string())
    } else {
        IndexError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl IndexStore for ElasticIndex {
    async fn get_by_record(&self, record_id: RecordId) -> IndexResult<Option<ClusterDocument>> {
        let url = self.url(&format!("_doc/{}", record_id));
        let response = self.client.get(&url).send().await.map_err(map_transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value: Value = response
                    .json()
                    .await
                    .map_err(|e| IndexError::Malformed(e.to_string()))?;
                let document = serde_json::from_value(value["_source"].clone())
                    .map_err(|e| IndexError::Malformed(e.to_string()))?;
                Ok(Some(document))
            }
            status => Err(IndexError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn get_by_cluster(&self, cluster_id: ClusterId) -> IndexResult<Option<ClusterDocument>> {
        self.search_one(root_query(cluster_id)).await
    }

    async fn max_cluster_id(&self) -> IndexResult<Option<ClusterId>> {
        let body = json!({
            "size": 0,
            "aggs": { "max_cluster": { "max": { "field": "cluster_id" } } }
        });
        let value = self.send(Method::POST, &self.url("_search"), Some(body)).await?;
        // Empty index reports null
        Ok(value["aggregations"]["max_cluster"]["value"]
            .as_f64()
            .map(|v| v as ClusterId))
    }

    async fn put(&self, document: ClusterDocument) -> IndexResult<()> {
        let url = self.url(&format!("_doc/{}?refresh=wait_for", document.record_id));
        let body = serde_json::to_value(&document).map_err(|e| IndexError::Malformed(e.to_string()))?;
        self.send(Method::PUT, &url, Some(body)).await?;
        Ok(())
    }

    async fn append_to_root(
        &self,
        cluster_id: ClusterId,
        children: &[RecordId],
        names: &[String],
    ) -> IndexResult<()> {
        self.update_root(
            cluster_id,
            APPEND_SCRIPT,
            json!({ "children": children, "names": names }),
        )
        .await
    }

    async fn remove_child(&self, cluster_id: ClusterId, child: RecordId) -> IndexResult<()> {
        self.update_root(cluster_id, REMOVE_CHILD_SCRIPT, json!({ "child": child }))
            .await
    }

    async fn set_parent(&self, record_id: RecordId, parent: ClusterId) -> IndexResult<()> {
        let url = self.url(&format!("_update/{}?refresh=true", record_id));
        let body = json!({
            "script": { "lang": "painless", "source": SET_PARENT_SCRIPT, "params": { "parent": parent } }
        });
        match self.send(Method::POST, &url, Some(body)).await {
            Err(IndexError::Rejected { status: 404, .. }) => {
                Err(IndexError::Missing(format!("record {}", record_id)))
            }
            other => other.map(|_| ()),
        }
    }

    async fn bulk_delete(&self, record_ids: &[RecordId]) -> IndexResult<usize> {
        if record_ids.is_empty() {
            return Ok(0);
        }
        let body = json!({ "query": { "terms": { "record_id": record_ids } } });
        let value = self
            .send(Method::POST, &self.url("_delete_by_query?refresh=true"), Some(body))
            .await?;
        Ok(value["deleted"].as_u64().unwrap_or(0) as usize)
    }

    async fn scan_dataset(&self, dataset: &str) -> IndexResult<Vec<ClusterDocument>> {
        self.search_all(json!({ "term": { "dataset": dataset } })).await
    }

    async fn members_of(&self, cluster_id: ClusterId) -> IndexResult<Vec<ClusterDocument>> {
        self.search_all(json!({
            "bool": {
                "filter": [
                    { "term": { "relation.name": "child" } },
                    { "term": { "relation.parent": cluster_id } }
                ]
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_trims_trailing_slash() {
        let index = ElasticIndex::new("http://localhost:9200/", "gazetteer", Duration::from_secs(1)).unwrap();
        assert_eq!(index.url("_search"), "http://localhost:9200/gazetteer/_search");
    }

    #[test]
    fn test_root_query_filters_parent_relation() {
        let query = root_query(11);
        assert_eq!(query["bool"]["filter"][0]["term"]["cluster_id"], 11);
        assert_eq!(query["bool"]["filter"][1]["term"]["relation.name"], "parent");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        // Port 9 (discard) is closed on test hosts
        let index = ElasticIndex::new("http://127.0.0.1:9", "gazetteer", Duration::from_millis(500)).unwrap();
        let err = index.get_by_record(1).await.unwrap_err();
        assert!(
            matches!(err, IndexError::Unavailable(_) | IndexError::Timeout(_)),
            "got {:?}",
            err
        );
    }
}
