pub mod batcher;
pub mod endpoints;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod traits;

pub use batcher::Batcher;
pub use endpoints::{ElasticCursor, ElasticIndex, FileSink, FileSource};
pub use error::{EndpointError, TransferError};
pub use extract::{extract_collections, hit_to_record};
pub use ingest::{ingest, IngestConfig, ItemStatus, RoundOutcome};
pub use metadata::{IndexDefinition, IndexMetadata};
pub use models::{
    Batch, CollectionSet, ExtractionReport, IngestReport, RawHit, SettingsOverrides,
    TransferOptions, TransferRecord, TransferReport,
};
pub use orchestrator::TransferCoordinator;
pub use traits::{BulkItem, BulkWriter, Cursor, Scanner, Sink, Source};
