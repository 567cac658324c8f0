use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::time::Duration;

/// A single document in flight: its id, the collection (type) it belongs to and
/// the serialized document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub id: String,
    pub collection: String,
    pub payload: Vec<u8>,
}

impl TransferRecord {
    pub fn new(id: impl Into<String>, collection: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload: payload.into(),
        }
    }
}

/// A bounded group of records handed from the extractor to the ingestor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch(Vec<TransferRecord>);

impl Batch {
    pub fn new(records: Vec<TransferRecord>) -> Self {
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.0
    }

    pub fn into_records(self) -> Vec<TransferRecord> {
        self.0
    }
}

/// One hit as returned by a paginated scan. The body is kept as the exact
/// text the service sent.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Box<RawValue>,
}

/// Ordered, de-duplicated collection names discovered from index mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSet(Vec<String>);

impl CollectionSet {
    pub fn new<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !collected.contains(&name) {
                collected.push(name);
            }
        }
        Self(collected)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverrides {
    pub replicas: Option<u32>,
    pub shards: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Requested page size for each scan request.
    pub window: usize,
    /// Number of records per bulk batch.
    pub bulk_size: usize,
    /// Number of concurrent ingest workers.
    pub parallelism: usize,
    /// Number of batches buffered between extraction and ingestion.
    pub channel_capacity: usize,
    /// Delete the destination before writing metadata.
    pub overwrite: bool,
    pub overrides: SettingsOverrides,
    /// Pause between resubmissions of overloaded records once input is exhausted.
    pub retry_backoff: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            window: 100,
            bulk_size: 500,
            parallelism: 4,
            channel_capacity: 10,
            overwrite: false,
            overrides: SettingsOverrides::default(),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl TransferOptions {
    pub fn validate(&self) -> Result<(), TransferError> {
        let checks = [
            ("window", self.window),
            ("bulk_size", self.bulk_size),
            ("parallelism", self.parallelism),
            ("channel_capacity", self.channel_capacity),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(TransferError::InvalidArgument(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub collections: usize,
    pub pages: usize,
    pub records: usize,
    pub batches: usize,
}

/// Per-record accounting of an ingestion run. Duplicates are counted within
/// `delivered`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub batches: usize,
    pub submitted: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub retried: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.batches += other.batches;
        self.submitted += other.submitted;
        self.delivered += other.delivered;
        self.duplicates += other.duplicates;
        self.dropped += other.dropped;
        self.retried += other.retried;
    }
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub index: String,
    pub collections: usize,
    pub extraction: ExtractionReport,
    pub ingestion: IngestReport,
}
