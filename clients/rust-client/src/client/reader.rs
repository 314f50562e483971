use super::BridgeClient;
use crate::protocol::{
    decode_row, BridgeError, ColumnDescriptor, Command, Response, SqlValue,
};

/// Pulls frames of a result set on demand and yields decoded rows.
pub struct ResultReader<'a> {
    client: &'a mut BridgeClient,
    result_set_id: String,
    columns: Vec<ColumnDescriptor>,
    chunk_size: i32,
    frame: Vec<u8>,
    pos: usize,
    completed: bool,
}

impl<'a> ResultReader<'a> {
    pub fn new(
        client: &'a mut BridgeClient,
        result_set_id: String,
        columns: Vec<ColumnDescriptor>,
    ) -> Self {
        let chunk_size = client.chunk_size;
        Self {
            client,
            result_set_id,
            columns,
            chunk_size,
            frame: Vec::new(),
            pos: 0,
            completed: false,
        }
    }

    pub fn with_chunk_size(mut self, bytes: i32) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn result_set_id(&self) -> &str {
        &self.result_set_id
    }

    /// Request one frame. `None` once the gateway reports completion.
    pub async fn read_chunk(&mut self) -> Result<Option<(Vec<u8>, bool)>, BridgeError> {
        if self.completed {
            return Ok(None);
        }
        let response = self
            .client
            .send_command(Command::ReadResultSet {
                result_set_id: self.result_set_id.clone(),
                chunk_size: self.chunk_size,
            })
            .await?;
        match response {
            Response::Chunk { rows, is_completed } => {
                self.completed = is_completed;
                Ok(Some((rows, is_completed)))
            }
            Response::Completed => {
                self.completed = true;
                Ok(None)
            }
            other => Err(BridgeClient::unexpected(other, "chunk")),
        }
    }

    pub async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, BridgeError> {
        while self.pos >= self.frame.len() {
            match self.read_chunk().await? {
                Some((rows, _)) => {
                    self.frame = rows;
                    self.pos = 0;
                }
                None => return Ok(None),
            }
        }
        if self.columns.is_empty() {
            return Err(BridgeError::EncodingError(
                "row data for a result set without columns".to_string(),
            ));
        }
        decode_row(&self.frame, &mut self.pos, self.columns.len()).map(Some)
    }

    pub async fn collect_rows(&mut self) -> Result<Vec<Vec<SqlValue>>, BridgeError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn close(self) -> Result<(), BridgeError> {
        self.client
            .send_expect_ok(Command::CloseResultSet {
                result_set_id: self.result_set_id,
            })
            .await
    }
}

impl BridgeClient {
    /// Reader over a result set returned by `execute` or a metadata call
    pub fn reader(
        &mut self,
        result_set_id: &str,
        columns: Vec<ColumnDescriptor>,
    ) -> ResultReader<'_> {
        ResultReader::new(self, result_set_id.to_string(), columns)
    }
}
