use crate::batcher::Batcher;
use crate::endpoints::write_create_pair;
use crate::error::{EndpointError, TransferError};
use crate::extract::extract_collections;
use crate::ingest::{ingest, IngestConfig};
use crate::metadata::IndexMetadata;
use crate::models::{
    Batch, CollectionSet, ExtractionReport, IngestReport, RawHit, SettingsOverrides, TransferRecord,
};
use crate::traits::{BulkItem, BulkWriter, Cursor, Scanner, Sink, Source};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::{Position, Url};

const BACKEND: &str = "elasticsearch";

/// How long the server keeps a scroll alive between two page requests.
pub const SCROLL_RETENTION: &str = "5m";

/// Connection to a single index of a remote search service.
#[derive(Debug, Clone)]
pub struct ElasticIndex {
    client: Client,
    endpoint: String,
    index_path: String,
    retry_backoff: Duration,
}

impl ElasticIndex {
    /// Accepts `host:port/index` or a full `http(s)://host:port/index` URL.
    pub fn connect(url: &str) -> Result<Self, EndpointError> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        };
        let parsed = Url::parse(&url)?;

        let index_path = parsed.path().trim_end_matches('/').to_string();
        if index_path.is_empty() {
            return Err(EndpointError::MissingIndex(url));
        }

        Ok(Self {
            client: Client::new(),
            endpoint: parsed[..Position::BeforePath].to_string(),
            index_path,
            retry_backoff: Duration::from_millis(100),
        })
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn index_url(&self) -> String {
        format!("{}{}", self.endpoint, self.index_path)
    }

    /// Reads index metadata. Aliases are cleared so a restored index never
    /// claims the names still held by the original.
    pub async fn fetch_metadata(&self) -> Result<IndexMetadata, EndpointError> {
        let response = self.client.get(self.index_url()).send().await?;
        let body = read_body(response).await?;

        let mut metadata = IndexMetadata::from_blob(&body)?;
        metadata.clear_aliases();
        info!(
            index = %metadata.name,
            collections = ?metadata.collections().iter().collect::<Vec<_>>(),
            "read index metadata"
        );
        Ok(metadata)
    }

    pub async fn create_index(
        &self,
        metadata: &IndexMetadata,
        overrides: &SettingsOverrides,
    ) -> Result<(), EndpointError> {
        let definition = metadata.prepared_for_target(overrides);
        info!(
            index = %self.index_url(),
            collections = ?metadata.collections().iter().collect::<Vec<_>>(),
            "creating index"
        );

        let response = self
            .client
            .put(self.index_url())
            .json(&definition)
            .send()
            .await?;
        read_body(response).await?;
        Ok(())
    }

    /// Deleting an index that does not exist is not an error.
    pub async fn remove_index(&self) -> Result<(), EndpointError> {
        let response = self.client.delete(self.index_url()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index = %self.index_url(), "index absent, nothing to delete");
            return Ok(());
        }
        read_body(response).await?;
        info!(index = %self.index_url(), "deleted index");
        Ok(())
    }
}

async fn read_body(response: Response) -> Result<Vec<u8>, EndpointError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(EndpointError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {}", String::from_utf8_lossy(&body)),
        });
    }
    Ok(body.to_vec())
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: ScrollHits,
}

#[derive(Debug, Default, Deserialize)]
struct ScrollHits {
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// Scroll over one collection. Hits returned by the opening request (when
/// the server does not use scan semantics) are served as the first page.
pub struct ElasticCursor {
    client: Client,
    endpoint: String,
    scroll_id: String,
    pending: Vec<RawHit>,
}

#[async_trait]
impl Cursor for ElasticCursor {
    async fn next_page(&mut self) -> Result<Vec<RawHit>, EndpointError> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }

        let response = self
            .client
            .get(format!("{}/_search/scroll", self.endpoint))
            .query(&[("scroll", SCROLL_RETENTION), ("scroll_id", self.scroll_id.as_str())])
            .send()
            .await?;
        let body = read_body(response).await?;
        let page: ScrollResponse = serde_json::from_slice(&body)?;

        if let Some(scroll_id) = page.scroll_id {
            self.scroll_id = scroll_id;
        }
        Ok(page.hits.hits)
    }
}

#[async_trait]
impl Scanner for ElasticIndex {
    type Cursor = ElasticCursor;

    async fn open_scan(&self, collection: &str, window: usize) -> Result<ElasticCursor, EndpointError> {
        let response = self
            .client
            .get(format!("{}/{}/_search", self.index_url(), collection))
            .query(&[("search_type", "scan"), ("scroll", SCROLL_RETENTION)])
            .json(&json!({
                "query": {"match_all": {}},
                "size": window
            }))
            .send()
            .await?;
        let body = read_body(response).await?;
        let opened: ScrollResponse = serde_json::from_slice(&body)?;

        let scroll_id = opened.scroll_id.ok_or_else(|| EndpointError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("scan over `{collection}` returned no _scroll_id"),
        })?;

        Ok(ElasticCursor {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            scroll_id,
            pending: opened.hits.hits,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkResponseItem>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    create: Option<BulkItemBody>,
}

#[derive(Debug, Deserialize)]
struct BulkItemBody {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
}

#[async_trait]
impl BulkWriter for ElasticIndex {
    async fn bulk_create(&self, records: &[TransferRecord]) -> Result<Vec<BulkItem>, EndpointError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut payload = Vec::new();
        for record in records {
            write_create_pair(record, &mut payload)?;
        }

        let response = self
            .client
            .put(format!("{}/_bulk", self.index_url()))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let body = read_body(response).await?;
        let parsed: BulkResponse = serde_json::from_slice(&body)?;

        if !parsed.errors {
            return Ok(records
                .iter()
                .map(|record| BulkItem {
                    id: record.id.clone(),
                    status: 201,
                })
                .collect());
        }

        parsed
            .items
            .into_iter()
            .map(|item| {
                item.create
                    .map(|body| BulkItem {
                        id: body.id,
                        status: body.status,
                    })
                    .ok_or_else(|| EndpointError::BackendResponse {
                        backend: BACKEND.to_string(),
                        details: "bulk item without a create result".to_string(),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl Source for ElasticIndex {
    async fn get_index(&mut self) -> Result<IndexMetadata, EndpointError> {
        self.fetch_metadata().await
    }

    async fn stream_to(
        self,
        collections: CollectionSet,
        window: usize,
        bulk_size: usize,
        dest: Sender<Batch>,
    ) -> Result<ExtractionReport, TransferError> {
        let batcher = Batcher::new(bulk_size, dest)?;
        extract_collections(&self, &collections, window, batcher).await
    }
}

#[async_trait]
impl Sink for ElasticIndex {
    async fn put_index(
        &mut self,
        metadata: &IndexMetadata,
        overrides: &SettingsOverrides,
    ) -> Result<(), EndpointError> {
        self.create_index(metadata, overrides).await
    }

    async fn delete_index(&mut self) -> Result<(), EndpointError> {
        self.remove_index().await
    }

    async fn accept_from(
        self,
        parallelism: usize,
        src: Receiver<Batch>,
    ) -> Result<IngestReport, TransferError> {
        let config = IngestConfig {
            parallelism,
            retry_backoff: self.retry_backoff,
        };
        ingest(self, config, src).await
    }
}
