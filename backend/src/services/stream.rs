//! Chunked, ordered streams over one barcode's sales or supplies
//!
//! A stream never holds a database cursor open between chunks. It reads
//! `chunk_size` rows, hands them out one at a time, and fetches the next
//! chunk from just after the last row it read.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Position, Sale, ScanFrom, Supply};
use crate::store::LedgerTx;

/// A record that can be scanned in (time, id) order
#[async_trait]
pub trait StreamRecord: Sized + Send {
    fn position(&self) -> Position;

    async fn fetch(tx: &mut dyn LedgerTx, from: ScanFrom, limit: usize) -> AppResult<Vec<Self>>;
}

#[async_trait]
impl StreamRecord for Sale {
    fn position(&self) -> Position {
        Sale::position(self)
    }

    async fn fetch(tx: &mut dyn LedgerTx, from: ScanFrom, limit: usize) -> AppResult<Vec<Self>> {
        tx.scan_sales(from, limit).await
    }
}

#[async_trait]
impl StreamRecord for Supply {
    fn position(&self) -> Position {
        Supply::position(self)
    }

    async fn fetch(tx: &mut dyn LedgerTx, from: ScanFrom, limit: usize) -> AppResult<Vec<Self>> {
        tx.scan_supplies(from, limit).await
    }
}

/// Finite, non-restartable stream of records
pub struct OrderedStream<T> {
    buffer: VecDeque<T>,
    fetch_from: ScanFrom,
    origin: ScanFrom,
    last_yielded: Option<Position>,
    chunk_size: usize,
    finished: bool,
    chunks_fetched: usize,
}

pub type SaleStream = OrderedStream<Sale>;
pub type SupplyStream = OrderedStream<Supply>;

impl<T: StreamRecord> OrderedStream<T> {
    pub fn open(from: ScanFrom, chunk_size: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            fetch_from: from,
            origin: from,
            last_yielded: None,
            chunk_size: chunk_size.max(1),
            finished: false,
            chunks_fetched: 0,
        }
    }

    /// Next record, or `Ok(None)` once the stream is drained. Stays `None`
    /// after that.
    pub async fn next(&mut self, tx: &mut dyn LedgerTx) -> AppResult<Option<T>> {
        if self.buffer.is_empty() && !self.finished {
            let chunk = T::fetch(tx, self.fetch_from, self.chunk_size).await?;
            self.chunks_fetched += 1;
            if chunk.len() < self.chunk_size {
                self.finished = true;
            }
            if let Some(last) = chunk.last() {
                self.fetch_from = ScanFrom::After(last.position());
            }
            self.buffer.extend(chunk);
        }

        let record = self.buffer.pop_front();
        match &record {
            Some(r) => self.last_yielded = Some(r.position()),
            None => self.finished = true,
        }
        Ok(record)
    }

    /// Where the records this stream has not handed out yet begin
    pub fn unread_from(&self) -> ScanFrom {
        match self.last_yielded {
            Some(position) => ScanFrom::After(position),
            None => self.origin,
        }
    }

    pub fn chunks_fetched(&self) -> usize {
        self.chunks_fetched
    }
}
