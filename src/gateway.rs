//! Gateway facade
//!
//! Owns the session store and the services built on it. Protocol handlers
//! share one `Arc<Gateway>`; every method is blocking.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendRegistry;
use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::session::{ConnectionManager, MetadataService, SessionStore, StatementManager};
use crate::stream::{Frame, ResultStreamer};

pub struct Gateway {
    store: Arc<SessionStore>,
    connections: ConnectionManager,
    statements: StatementManager,
    metadata: MetadataService,
    streamer: ResultStreamer,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(BackendRegistry::with_defaults(), ResultStreamer::default())
    }
}

impl Gateway {
    pub fn new(backends: BackendRegistry, streamer: ResultStreamer) -> Self {
        let store = Arc::new(SessionStore::new());
        Self {
            connections: ConnectionManager::new(store.clone(), backends),
            statements: StatementManager::new(store.clone()),
            metadata: MetadataService::new(store.clone()),
            store,
            streamer,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        let streamer = ResultStreamer::new(
            Duration::from_millis(config.flush_budget_ms),
            config.max_chunk_bytes,
        );
        Self::new(BackendRegistry::with_defaults(), streamer)
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn statements(&self) -> &StatementManager {
        &self.statements
    }

    pub fn metadata(&self) -> &MetadataService {
        &self.metadata
    }

    pub fn streamer(&self) -> &ResultStreamer {
        &self.streamer
    }

    /// Next frame of a result set; `None` once it is exhausted
    pub fn read_result_set(
        &self,
        result_set_id: &str,
        chunk_size: i32,
    ) -> GatewayResult<Option<Frame>> {
        let entry = self.store.result_sets.get(result_set_id)?;
        let frame = self.streamer.read(&entry, chunk_size)?;
        if let Some(frame) = &frame {
            tracing::debug!(
                "Result set {}: {} bytes, completed={}",
                result_set_id,
                frame.rows.len(),
                frame.is_completed
            );
        }
        Ok(frame)
    }

    pub fn close_result_set(&self, result_set_id: &str) -> GatewayResult<()> {
        self.store.close_result_set(result_set_id)
    }
}
