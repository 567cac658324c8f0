use crate::error::{EndpointError, TransferError};
use crate::metadata::IndexMetadata;
use crate::models::{
    Batch, CollectionSet, ExtractionReport, IngestReport, RawHit, SettingsOverrides, TransferRecord,
};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;

/// An open server-side scan over one collection.
///
/// Every call consumes server state. An empty page means the scan is
/// exhausted; callers must not call `next_page` again after that.
#[async_trait]
pub trait Cursor: Send {
    async fn next_page(&mut self) -> Result<Vec<RawHit>, EndpointError>;
}

#[async_trait]
pub trait Scanner: Send + Sync {
    type Cursor: Cursor;

    async fn open_scan(&self, collection: &str, window: usize) -> Result<Self::Cursor, EndpointError>;
}

/// Outcome of one create operation inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: String,
    pub status: u16,
}

#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// Submits `records` as create operations and returns one item per record,
    /// in request order. Transport failures are returned as errors; per-record
    /// rejections are reported through the item status.
    async fn bulk_create(&self, records: &[TransferRecord]) -> Result<Vec<BulkItem>, EndpointError>;
}

#[async_trait]
pub trait Source: Send {
    async fn get_index(&mut self) -> Result<IndexMetadata, EndpointError>;

    /// Streams every record into `dest` in batches of `bulk_size` and closes
    /// the channel when done.
    async fn stream_to(
        self,
        collections: CollectionSet,
        window: usize,
        bulk_size: usize,
        dest: Sender<Batch>,
    ) -> Result<ExtractionReport, TransferError>;
}

#[async_trait]
pub trait Sink: Send {
    async fn put_index(
        &mut self,
        metadata: &IndexMetadata,
        overrides: &SettingsOverrides,
    ) -> Result<(), EndpointError>;

    async fn delete_index(&mut self) -> Result<(), EndpointError>;

    async fn accept_from(
        self,
        parallelism: usize,
        src: Receiver<Batch>,
    ) -> Result<IngestReport, TransferError>;
}
