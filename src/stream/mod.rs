//! Result streaming
//!
//! A result set is read in frames. Each chunk request encodes rows until the
//! frame reaches the requested size or the flush budget elapses, whichever
//! comes first. One row is always fetched ahead so a frame knows whether it
//! is the last one.
//!
//! A row that cannot be fetched or encoded ends the stream: the rows before
//! it still go out in a frame that is not completed, and the next read
//! reports the error.

pub mod encoder;

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sqlbridge_client::protocol::{ColumnDescriptor, MAX_MESSAGE_SIZE};

use crate::backend::{BackendCursor, NativeRow};
use crate::error::{GatewayError, GatewayResult};

pub use encoder::{encode_row, encode_value};

pub const DEFAULT_FLUSH_BUDGET: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Room left in a response message for everything but the row bytes
const FRAME_ENVELOPE_BYTES: usize = 1024;

/// Largest row payload a single chunk response can carry
pub const MAX_FRAME_ROWS_BYTES: usize = MAX_MESSAGE_SIZE - FRAME_ENVELOPE_BYTES;

/// Who a result set belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSetOwner {
    Statement(String),
    /// Metadata queries hang off the connection directly
    Connection(String),
}

/// One frame of encoded rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub rows: Vec<u8>,
    pub is_completed: bool,
}

struct CursorState {
    cursor: Box<dyn BackendCursor>,
    /// Row fetched ahead, not yet encoded
    next: Option<NativeRow>,
    /// Encoded row that did not fit in the previous frame
    carry: Option<Vec<u8>>,
    /// Error met while fetching ahead, reported once buffered rows are sent
    error: Option<GatewayError>,
    failure: Option<String>,
}

/// A registered result set
pub struct ResultSetEntry {
    owner: ResultSetOwner,
    columns: Vec<ColumnDescriptor>,
    state: Mutex<CursorState>,
}

fn normalize_columns(columns: &[ColumnDescriptor]) -> Vec<ColumnDescriptor> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut column = c.clone();
            column.ordinal = i as i32;
            if column.column_label.is_empty() {
                column.column_label = column.column_name.clone();
            }
            column.is_aliased = column.column_name != column.column_label;
            column
        })
        .collect()
}

impl ResultSetEntry {
    /// Wrap a cursor, fetching its first row to learn whether it has any
    pub fn open(owner: ResultSetOwner, mut cursor: Box<dyn BackendCursor>) -> GatewayResult<Self> {
        let columns = normalize_columns(cursor.columns());
        let next = cursor.next_row().map_err(GatewayError::execution)?;
        Ok(Self {
            owner,
            columns,
            state: Mutex::new(CursorState {
                cursor,
                next,
                carry: None,
                error: None,
                failure: None,
            }),
        })
    }

    pub fn owner(&self) -> &ResultSetOwner {
        &self.owner
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn has_rows(&self) -> bool {
        let state = self.state.lock();
        state.next.is_some() || state.carry.is_some()
    }

    /// Produce the next frame, or `None` once every row has been sent
    pub fn next_frame(&self, limit: usize, budget: Duration) -> GatewayResult<Option<Frame>> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.failure {
            return Err(GatewayError::ExecutionError(format!(
                "result set failed earlier: {}",
                failure
            )));
        }

        let started = Instant::now();
        let mut buf = state.carry.take().unwrap_or_default();

        loop {
            if !buf.is_empty() {
                let exhausted = state.next.is_none();
                if exhausted || buf.len() >= limit || started.elapsed() >= budget {
                    return Ok(Some(Frame {
                        rows: buf,
                        is_completed: exhausted && state.error.is_none(),
                    }));
                }
            }

            // buf is empty whenever no row is left
            let Some(row) = state.next.take() else {
                return match state.error.take() {
                    Some(err) => {
                        state.failure = Some(err.to_string());
                        Err(err)
                    }
                    None => Ok(None),
                };
            };

            let mark = buf.len();
            if let Err(e) = encode_row(&mut buf, row) {
                buf.truncate(mark);
                state.error = Some(e);
                continue;
            }
            let row_len = buf.len() - mark;
            if row_len > MAX_FRAME_ROWS_BYTES {
                buf.truncate(mark);
                state.error = Some(GatewayError::EncodingError(format!(
                    "row of {} bytes exceeds the {} byte frame limit",
                    row_len, MAX_FRAME_ROWS_BYTES
                )));
                continue;
            }
            match state.cursor.next_row() {
                Ok(next) => state.next = next,
                Err(e) => state.error = Some(GatewayError::execution(e)),
            }

            if mark > 0 && buf.len() > limit {
                state.carry = Some(buf.split_off(mark));
                return Ok(Some(Frame {
                    rows: buf,
                    is_completed: false,
                }));
            }
        }
    }

    /// Release the backend cursor
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.next = None;
        state.carry = None;
        state.error = None;
        if let Err(e) = state.cursor.close() {
            tracing::warn!("Failed to close cursor: {}", e);
        }
    }
}

/// Chunk size policy applied to every read
#[derive(Debug, Clone, Copy)]
pub struct ResultStreamer {
    flush_budget: Duration,
    max_chunk_bytes: usize,
}

impl Default for ResultStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_BUDGET, DEFAULT_MAX_CHUNK_BYTES)
    }
}

impl ResultStreamer {
    /// `max_chunk_bytes` is kept within `1..=MAX_FRAME_ROWS_BYTES`
    pub fn new(flush_budget: Duration, max_chunk_bytes: usize) -> Self {
        Self {
            flush_budget,
            max_chunk_bytes: max_chunk_bytes.clamp(1, MAX_FRAME_ROWS_BYTES),
        }
    }

    pub fn flush_budget(&self) -> Duration {
        self.flush_budget
    }

    pub fn read(&self, entry: &ResultSetEntry, chunk_size: i32) -> GatewayResult<Option<Frame>> {
        if chunk_size <= 0 {
            return Err(GatewayError::ProtocolError(format!(
                "chunk size must be positive, got {}",
                chunk_size
            )));
        }
        let limit = (chunk_size as usize).min(self.max_chunk_bytes);
        entry.next_frame(limit, self.flush_budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, MaterializedCursor, NativeValue};
    use sqlbridge_client::protocol::{sql_types, RowIter};

    fn int_rows(values: &[i32]) -> Vec<NativeRow> {
        values.iter().map(|v| vec![NativeValue::I32(*v)]).collect()
    }

    fn entry(rows: Vec<NativeRow>) -> ResultSetEntry {
        let columns = vec![ColumnDescriptor::new(0, "n", sql_types::INTEGER, "INTEGER")];
        ResultSetEntry::open(
            ResultSetOwner::Statement("s".into()),
            Box::new(MaterializedCursor::new(columns, rows)),
        )
        .unwrap()
    }

    fn row_count(frame: &Frame) -> usize {
        RowIter::new(&frame.rows, 1).count()
    }

    // an encoded int row is 5 bytes
    const ROW: usize = 5;

    #[test]
    fn test_empty_result_completes_immediately() {
        let entry = entry(vec![]);
        assert!(!entry.has_rows());
        assert_eq!(entry.next_frame(100, DEFAULT_FLUSH_BUDGET).unwrap(), None);
    }

    #[test]
    fn test_all_rows_fit_in_one_frame() {
        let entry = entry(int_rows(&[1, 2, 3]));
        assert!(entry.has_rows());
        let frame = entry.next_frame(100, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert!(frame.is_completed);
        assert_eq!(row_count(&frame), 3);
        assert_eq!(entry.next_frame(100, DEFAULT_FLUSH_BUDGET).unwrap(), None);
    }

    #[test]
    fn test_row_that_does_not_fit_is_carried() {
        // two rows fit under 12 bytes, the third would not
        let entry = entry(int_rows(&[1, 2, 3]));
        let first = entry.next_frame(12, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(first.rows.len(), 2 * ROW);
        assert!(!first.is_completed);

        let second = entry.next_frame(12, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(second.rows.len(), ROW);
        assert!(second.is_completed);
    }

    #[test]
    fn test_exact_fit_without_more_rows_is_completed() {
        let entry = entry(int_rows(&[1, 2]));
        let frame = entry.next_frame(2 * ROW, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(row_count(&frame), 2);
        assert!(frame.is_completed);
    }

    #[test]
    fn test_oversized_row_is_sent_alone() {
        let entry = entry(int_rows(&[1, 2]));
        let frame = entry.next_frame(1, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(row_count(&frame), 1);
        assert!(!frame.is_completed);
        let frame = entry.next_frame(1, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(row_count(&frame), 1);
        assert!(frame.is_completed);
        assert_eq!(entry.next_frame(1, DEFAULT_FLUSH_BUDGET).unwrap(), None);
    }

    #[test]
    fn test_zero_budget_flushes_every_row() {
        let entry = entry(int_rows(&[1, 2, 3]));
        let frame = entry.next_frame(1024, Duration::ZERO).unwrap().unwrap();
        assert_eq!(row_count(&frame), 1);
        assert!(!frame.is_completed);
    }

    #[test]
    fn test_chunk_size_validation_and_clamp() {
        let streamer = ResultStreamer::new(DEFAULT_FLUSH_BUDGET, 2 * ROW);
        let entry = entry(int_rows(&[1, 2, 3, 4]));
        assert!(matches!(
            streamer.read(&entry, 0),
            Err(GatewayError::ProtocolError(_))
        ));
        assert!(streamer.read(&entry, -5).is_err());
        let frame = streamer.read(&entry, i32::MAX).unwrap().unwrap();
        assert_eq!(row_count(&frame), 2);
    }

    struct BrokenCursor {
        columns: Vec<ColumnDescriptor>,
        served: bool,
    }

    impl BackendCursor for BrokenCursor {
        fn columns(&self) -> &[ColumnDescriptor] {
            &self.columns
        }

        fn next_row(&mut self) -> BackendResult<Option<NativeRow>> {
            if self.served {
                return Err(BackendError::InvalidState("cursor lost".into()));
            }
            self.served = true;
            Ok(Some(vec![NativeValue::I32(1)]))
        }

        fn close(&mut self) -> BackendResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fetch_failure_ends_stream_with_error() {
        let entry = ResultSetEntry::open(
            ResultSetOwner::Connection("c".into()),
            Box::new(BrokenCursor {
                columns: vec![ColumnDescriptor::new(0, "n", sql_types::INTEGER, "INTEGER")],
                served: false,
            }),
        )
        .unwrap();
        // the row fetched before the failure still goes out
        let frame = entry.next_frame(100, DEFAULT_FLUSH_BUDGET).unwrap().unwrap();
        assert_eq!(row_count(&frame), 1);
        assert!(!frame.is_completed);

        match entry.next_frame(100, DEFAULT_FLUSH_BUDGET) {
            Err(GatewayError::ExecutionError(msg)) => assert!(msg.contains("cursor lost")),
            other => panic!("Unexpected result: {:?}", other),
        }
        match entry.next_frame(100, DEFAULT_FLUSH_BUDGET) {
            Err(GatewayError::ExecutionError(msg)) => assert!(msg.contains("failed earlier")),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_row_too_large_for_a_frame() {
        let columns = vec![ColumnDescriptor::new(0, "b", sql_types::BINARY, "BLOB")];
        let rows = vec![
            vec![NativeValue::Bytes(vec![1; 4])],
            vec![NativeValue::Bytes(vec![0; MAX_FRAME_ROWS_BYTES])],
            vec![NativeValue::Bytes(vec![2; 4])],
        ];
        let entry = ResultSetEntry::open(
            ResultSetOwner::Statement("s".into()),
            Box::new(MaterializedCursor::new(columns, rows)),
        )
        .unwrap();

        let frame = entry
            .next_frame(MAX_FRAME_ROWS_BYTES, DEFAULT_FLUSH_BUDGET)
            .unwrap()
            .unwrap();
        assert_eq!(RowIter::new(&frame.rows, 1).count(), 1);
        assert!(!frame.is_completed);
        assert!(matches!(
            entry.next_frame(MAX_FRAME_ROWS_BYTES, DEFAULT_FLUSH_BUDGET),
            Err(GatewayError::EncodingError(_))
        ));
        assert!(entry.next_frame(MAX_FRAME_ROWS_BYTES, DEFAULT_FLUSH_BUDGET).is_err());
    }

    #[test]
    fn test_max_chunk_bytes_stays_under_frame_limit() {
        let streamer = ResultStreamer::new(DEFAULT_FLUSH_BUDGET, usize::MAX);
        assert_eq!(streamer.max_chunk_bytes, MAX_FRAME_ROWS_BYTES);
        assert_eq!(ResultStreamer::new(DEFAULT_FLUSH_BUDGET, 0).max_chunk_bytes, 1);
    }

    #[test]
    fn test_aliased_columns() {
        let mut column = ColumnDescriptor::new(3, "id", sql_types::INTEGER, "INTEGER");
        column.column_label = "user_id".to_string();
        let entry = ResultSetEntry::open(
            ResultSetOwner::Connection("c".into()),
            Box::new(MaterializedCursor::new(vec![column], vec![])),
        )
        .unwrap();
        assert!(entry.columns()[0].is_aliased);
        assert_eq!(entry.columns()[0].ordinal, 0);
    }
}
