//! Background scan
//!
//! Runs a scan on its own thread and hands records over a bounded channel.
//! A full channel blocks the producer; a failed scan ends the stream with one
//! `Err` item; dropping the stream disconnects the channel and stops the
//! producer at its next send.

use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver};
use tracing::{debug, warn};

use crate::error::{CellarError, Result};

use super::Reader;

/// A decoded record with its position metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Bytes,
    /// Start position of the chunk or buffer holding the record
    pub chunk_pos: i64,
    /// Global position of the record
    pub start_pos: i64,
    /// Global position right after the record
    pub next_pos: i64,
}

/// Single-pass sequence of records produced by a background scan
pub struct ScanStream {
    receiver: Option<Receiver<Result<Record>>>,
    worker: Option<JoinHandle<()>>,
}

impl Reader {
    /// Start scanning on a background thread.
    ///
    /// At most `capacity` records are buffered ahead of the consumer.
    pub fn scan_async(&self, capacity: usize) -> Result<ScanStream> {
        let (sender, receiver) = channel::bounded(capacity);
        let reader = self.clone();

        let worker = thread::Builder::new()
            .name("cellar-scan".into())
            .spawn(move || {
                let result = reader.scan_records(|info, data| {
                    let record = Record {
                        data,
                        chunk_pos: info.chunk_pos,
                        start_pos: info.start_pos,
                        next_pos: info.next_pos,
                    };
                    sender.send(Ok(record)).map_err(|_| CellarError::Cancelled)
                });

                match result {
                    Ok(()) => debug!("Background scan finished"),
                    Err(CellarError::Cancelled) => debug!("Background scan cancelled"),
                    Err(e) => {
                        warn!(error = %e, "Background scan failed");
                        let _ = sender.send(Err(e));
                    }
                }
            })?;

        Ok(ScanStream {
            receiver: Some(receiver),
            worker: Some(worker),
        })
    }
}

impl ScanStream {
    /// Stop the producer and wait for it to exit; later calls to `next` return `None`
    pub fn cancel(&mut self) {
        self.receiver.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Background scan thread panicked");
            }
        }
    }
}

impl Iterator for ScanStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.cancel();
    }
}
