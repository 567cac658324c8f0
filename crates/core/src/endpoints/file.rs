//! Flat-file endpoint. Line 1 holds the metadata blob; every record follows
//! as a create-header line and a document line.

use crate::batcher::Batcher;
use crate::endpoints::{parse_create_header, write_create_pair};
use crate::error::{EndpointError, TransferError};
use crate::metadata::IndexMetadata;
use crate::models::{
    Batch, CollectionSet, ExtractionReport, IngestReport, SettingsOverrides, TransferRecord,
};
use crate::traits::{Sink, Source};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::info;

pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EndpointError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }

    /// Next line without its terminator, or `None` at end of file.
    async fn read_line(&mut self) -> Result<Option<String>, EndpointError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    async fn read_record(&mut self) -> Result<Option<TransferRecord>, EndpointError> {
        let header = loop {
            match self.read_line().await? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };
        let target = parse_create_header(&header)?;

        let body = self.read_line().await?.ok_or_else(|| {
            EndpointError::MalformedRecord(format!("record `{}` has no document line", target.id))
        })?;

        Ok(Some(TransferRecord::new(target.id, target.collection, body.into_bytes())))
    }
}

#[async_trait]
impl Source for FileSource {
    async fn get_index(&mut self) -> Result<IndexMetadata, EndpointError> {
        let line = self.read_line().await?.ok_or_else(|| {
            EndpointError::MalformedMetadata(format!("{} is empty", self.path.display()))
        })?;
        IndexMetadata::from_blob(line.as_bytes())
    }

    /// Records are replayed in file order; the collection set and window do
    /// not apply to a file.
    async fn stream_to(
        mut self,
        _collections: CollectionSet,
        _window: usize,
        bulk_size: usize,
        dest: Sender<Batch>,
    ) -> Result<ExtractionReport, TransferError> {
        let mut batcher = Batcher::new(bulk_size, dest)?;
        let mut seen = HashSet::new();
        let mut report = ExtractionReport::default();

        while let Some(record) = self.read_record().await? {
            seen.insert(record.collection.clone());
            report.records += 1;
            batcher.put(record).await?;
        }

        batcher.flush().await?;
        batcher.close();
        report.collections = seen.len();
        report.batches = batcher.emitted();

        info!(
            path = %self.path.display(),
            records = report.records,
            batches = report.batches,
            "read records from file"
        );
        Ok(report)
    }
}

pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates the output file; an existing file is only replaced when
    /// `overwrite` is set.
    pub async fn create(path: impl AsRef<Path>, overwrite: bool) -> Result<Self, EndpointError> {
        let path = path.as_ref().to_path_buf();
        if !overwrite && tokio::fs::try_exists(&path).await? {
            return Err(EndpointError::AlreadyExists(format!(
                "{} (use --force to overwrite)",
                path.display()
            )));
        }

        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn put_index(
        &mut self,
        metadata: &IndexMetadata,
        overrides: &SettingsOverrides,
    ) -> Result<(), EndpointError> {
        let prepared = IndexMetadata {
            name: metadata.name.clone(),
            definition: metadata.prepared_for_target(overrides),
        };
        let mut line = prepared.to_blob()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn delete_index(&mut self) -> Result<(), EndpointError> {
        Ok(())
    }

    /// Writes records sequentially; `parallelism` has no meaning for a file.
    async fn accept_from(
        mut self,
        _parallelism: usize,
        src: Receiver<Batch>,
    ) -> Result<IngestReport, TransferError> {
        let mut report = IngestReport::default();
        let mut buffer = Vec::new();

        while let Ok(batch) = src.recv().await {
            buffer.clear();
            for record in batch.records() {
                write_create_pair(record, &mut buffer)?;
            }
            self.writer
                .write_all(&buffer)
                .await
                .map_err(EndpointError::from)?;

            report.batches += 1;
            report.submitted += batch.len();
            report.delivered += batch.len();
        }

        self.writer.flush().await.map_err(EndpointError::from)?;
        info!(
            path = %self.path.display(),
            records = report.delivered,
            "wrote records to file"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn metadata() -> Result<IndexMetadata, EndpointError> {
        let blob = json!({
            "tweets": {
                "aliases": {"live": {}},
                "mappings": {"tweet": {}, "user": {}},
                "settings": {"index": {"number_of_shards": "5", "number_of_replicas": "1"}}
            }
        })
        .to_string();
        IndexMetadata::from_blob(blob.as_bytes())
    }

    fn batch(ids: &[(&str, &str)]) -> Batch {
        Batch::new(
            ids.iter()
                .map(|(id, collection)| {
                    TransferRecord::new(*id, *collection, format!("{{\"id\":\"{id}\"}}"))
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn sink_output_replays_through_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("tweets.dump");

        let mut sink = FileSink::create(&path, false).await?;
        sink.put_index(&metadata()?, &SettingsOverrides { replicas: Some(0), shards: None })
            .await?;
        let (tx, rx) = async_channel::bounded(4);
        tx.send(batch(&[("1", "tweet"), ("2", "tweet")])).await?;
        tx.send(batch(&[("u1", "user")])).await?;
        drop(tx);
        let written = sink.accept_from(8, rx).await?;
        assert_eq!(written.delivered, 3);

        let mut source = FileSource::open(&path).await?;
        let restored = source.get_index().await?;
        assert_eq!(restored.name, "tweets");
        let expected = r#"{"tweets":{"aliases":{},"mappings":{"tweet":{},"user":{}},"settings":{"index":{"number_of_shards":"5","number_of_replicas":"0"}}}}"#;
        assert_eq!(restored.to_blob()?, expected);
        let written_text = tokio::fs::read_to_string(&path).await?;
        assert_eq!(written_text.lines().next(), Some(expected));

        let (tx, rx) = async_channel::bounded(4);
        let report = source.stream_to(restored.collections(), 100, 2, tx).await?;
        let mut records = Vec::new();
        while let Ok(batch) = rx.recv().await {
            records.extend(batch.into_records());
        }

        assert_eq!(report.records, 3);
        assert_eq!(report.collections, 2);
        assert_eq!(report.batches, 2);
        assert_eq!(records[2], TransferRecord::new("u1", "user", r#"{"id":"u1"}"#));
        Ok(())
    }

    #[tokio::test]
    async fn existing_file_needs_overwrite() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("out.dump");
        std::fs::write(&path, b"old")?;

        assert!(matches!(
            FileSink::create(&path, false).await,
            Err(EndpointError::AlreadyExists(_))
        ));
        assert!(FileSink::create(&path, true).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn truncated_record_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.dump");
        std::fs::write(
            &path,
            "{\"t\":{\"mappings\":{\"a\":{}}}}\n{\"create\":{\"_id\":\"1\",\"_type\":\"a\"}}\n",
        )?;

        let mut source = FileSource::open(&path).await?;
        source.get_index().await?;
        let (tx, rx) = async_channel::bounded(1);
        let result = source.stream_to(CollectionSet::default(), 10, 10, tx).await;

        assert!(matches!(
            result,
            Err(TransferError::Endpoint(EndpointError::MalformedRecord(_)))
        ));
        assert!(rx.recv().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn empty_file_has_no_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.dump");
        std::fs::write(&path, b"")?;

        let mut source = FileSource::open(&path).await?;
        assert!(matches!(
            source.get_index().await,
            Err(EndpointError::MalformedMetadata(_))
        ));
        Ok(())
    }
}
