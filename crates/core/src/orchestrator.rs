use crate::error::TransferError;
use crate::models::{TransferOptions, TransferReport};
use crate::traits::{Sink, Source};
use tracing::{error, info};

/// Moves one index from a source to a sink: metadata first, then every
/// document through a single bounded channel.
pub struct TransferCoordinator<S, K>
where
    S: Source,
    K: Sink,
{
    source: S,
    sink: K,
    options: TransferOptions,
}

impl<S, K> TransferCoordinator<S, K>
where
    S: Source + 'static,
    K: Sink,
{
    pub fn new(source: S, sink: K, options: TransferOptions) -> Self {
        Self {
            source,
            sink,
            options,
        }
    }

    pub async fn run(self) -> Result<TransferReport, TransferError> {
        let Self {
            mut source,
            mut sink,
            options,
        } = self;
        options.validate()?;

        let metadata = source.get_index().await?;
        let collections = metadata.collections();

        if options.overwrite {
            sink.delete_index().await?;
        }
        sink.put_index(&metadata, &options.overrides).await?;

        info!(
            index = %metadata.name,
            collections = collections.len(),
            window = options.window,
            bulk_size = options.bulk_size,
            parallelism = options.parallelism,
            "starting transfer"
        );

        let (tx, rx) = async_channel::bounded(options.channel_capacity);
        let producer = tokio::spawn(source.stream_to(
            collections.clone(),
            options.window,
            options.bulk_size,
            tx,
        ));

        let ingestion = match sink.accept_from(options.parallelism, rx).await {
            Ok(report) => report,
            Err(ingest_error) => {
                producer.abort();
                return Err(ingest_error);
            }
        };

        let extraction = match producer.await? {
            Ok(report) => report,
            Err(extract_error) => {
                error!(error = %extract_error, "extraction failed after ingesting what was sent");
                return Err(TransferError::Extraction(Box::new(extract_error)));
            }
        };

        info!(
            index = %metadata.name,
            extracted = extraction.records,
            delivered = ingestion.delivered,
            duplicates = ingestion.duplicates,
            dropped = ingestion.dropped,
            "transfer finished"
        );

        Ok(TransferReport {
            index: metadata.name,
            collections: collections.len(),
            extraction,
            ingestion,
        })
    }
}
