//! CosmWasm contract indexer.
//!
//! Registered alongside the `tx` indexer so contract events share the block
//! pipeline. Both hooks are currently no-ops and search is not offered.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use txsink_core::codec::EncodingConfig;
use txsink_core::error::IndexerError;
use txsink_core::sink::{EventSink, ModuleEventSinkIndexer};
use txsink_core::types::{FinalizeBlockRequest, FinalizeBlockResponse};

pub const MODULE_NAME: &str = "wasm";

pub struct WasmEventSink {
    sink: Arc<dyn EventSink>,
    encoding: EncodingConfig,
}

impl WasmEventSink {
    pub fn new(sink: Arc<dyn EventSink>, encoding: EncodingConfig) -> Self {
        Self { sink, encoding }
    }
}

#[async_trait]
impl ModuleEventSinkIndexer for WasmEventSink {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn insert_module_events(
        &self,
        req: &FinalizeBlockRequest,
        _res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError> {
        trace!(height = req.height, "wasm insert hook");
        Ok(())
    }

    fn event_sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone()
    }

    fn encoding_config(&self) -> &EncodingConfig {
        &self.encoding
    }
}
