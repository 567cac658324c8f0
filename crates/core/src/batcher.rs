use crate::error::TransferError;
use crate::models::{Batch, TransferRecord};
use async_channel::Sender;

/// Accumulates records and emits fixed-size batches on a bounded channel.
///
/// Sending blocks while the channel is full, which is what throttles the
/// producer. Closing the channel is left to the owner of the batcher.
pub struct Batcher {
    size: usize,
    buffer: Vec<TransferRecord>,
    dest: Sender<Batch>,
    emitted: usize,
}

impl Batcher {
    pub fn new(size: usize, dest: Sender<Batch>) -> Result<Self, TransferError> {
        if size == 0 {
            return Err(TransferError::InvalidArgument(
                "batch size must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            size,
            buffer: Vec::with_capacity(size),
            dest,
            emitted: 0,
        })
    }

    pub async fn put(&mut self, record: TransferRecord) -> Result<(), TransferError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.size {
            self.send_buffer().await?;
        }
        Ok(())
    }

    /// Sends the partial buffer, if any. Never emits an empty batch.
    pub async fn flush(&mut self) -> Result<(), TransferError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.send_buffer().await
    }

    /// Closes the underlying channel for every sender and receiver.
    pub fn close(&self) {
        self.dest.close();
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    async fn send_buffer(&mut self) -> Result<(), TransferError> {
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
        self.dest
            .send(Batch::new(records))
            .await
            .map_err(|_| TransferError::ChannelClosed)?;
        self.emitted += 1;
        Ok(())
    }
}
