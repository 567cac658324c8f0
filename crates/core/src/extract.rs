use crate::batcher::Batcher;
use crate::error::{EndpointError, TransferError};
use crate::models::{CollectionSet, ExtractionReport, RawHit, TransferRecord};
use crate::traits::{Cursor, Scanner};
use tracing::{debug, info};

pub fn hit_to_record(hit: RawHit, collection: &str) -> Result<TransferRecord, EndpointError> {
    if hit.id.is_empty() {
        return Err(EndpointError::MalformedRecord(format!(
            "hit in `{collection}` has an empty _id"
        )));
    }
    // bare line breaks in raw JSON can only be whitespace between tokens
    let payload: Vec<u8> = hit
        .source
        .get()
        .bytes()
        .filter(|byte| !matches!(byte, b'\n' | b'\r'))
        .collect();
    Ok(TransferRecord::new(hit.id, collection, payload))
}

/// Drains one scan per collection into `batcher`, in collection order.
///
/// Batches are allowed to span collections; the batcher is flushed and the
/// channel closed only after the last collection is exhausted. On error the
/// batcher is dropped without flushing.
pub async fn extract_collections<S>(
    scanner: &S,
    collections: &CollectionSet,
    window: usize,
    mut batcher: Batcher,
) -> Result<ExtractionReport, TransferError>
where
    S: Scanner,
{
    let mut report = ExtractionReport::default();

    for collection in collections.iter() {
        info!(collection = %collection, window, "exporting collection");
        let mut cursor = scanner.open_scan(collection, window).await?;

        loop {
            let hits = cursor.next_page().await?;
            if hits.is_empty() {
                break;
            }

            debug!(collection = %collection, fetched = hits.len(), "fetched page");
            report.pages += 1;
            for hit in hits {
                batcher.put(hit_to_record(hit, collection)?).await?;
                report.records += 1;
            }
        }

        report.collections += 1;
    }

    batcher.flush().await?;
    batcher.close();
    report.batches = batcher.emitted();

    info!(
        collections = report.collections,
        records = report.records,
        batches = report.batches,
        "extraction finished"
    );
    Ok(report)
}
