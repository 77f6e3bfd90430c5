//! Registry of module indexers, fanned out on every finalized block.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::IndexerError;
use crate::query::Query;
use crate::sink::ModuleEventSinkIndexer;
use crate::types::{FinalizeBlockRequest, FinalizeBlockResponse, TxSearchResult};

/// Ordered set of module indexers keyed by module name.
#[derive(Default)]
pub struct ModuleSinkRegistry {
    indexers: Vec<Arc<dyn ModuleEventSinkIndexer>>,
}

impl ModuleSinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an indexer. Module names are unique.
    pub fn register(&mut self, indexer: Arc<dyn ModuleEventSinkIndexer>) -> Result<(), IndexerError> {
        let name = indexer.module_name();
        if self.get(name).is_some() {
            return Err(IndexerError::DuplicateModule {
                name: name.to_string(),
            });
        }
        debug!(module = name, "module indexer registered");
        self.indexers.push(indexer);
        Ok(())
    }

    pub fn get(&self, module: &str) -> Option<&Arc<dyn ModuleEventSinkIndexer>> {
        self.indexers.iter().find(|i| i.module_name() == module)
    }

    /// Module names in registration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.indexers.iter().map(|i| i.module_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    /// Run every insert hook for a finalized block, in registration order.
    ///
    /// The first failing hook ends the dispatch and its error is returned;
    /// nothing is retried.
    pub async fn dispatch_block(
        &self,
        req: &FinalizeBlockRequest,
        res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError> {
        for indexer in &self.indexers {
            if let Err(e) = indexer.insert_module_events(req, res).await {
                warn!(
                    module = indexer.module_name(),
                    height = req.height,
                    error = %e,
                    "module insert hook failed"
                );
                return Err(e);
            }
        }
        debug!(height = req.height, modules = self.indexers.len(), "block dispatched");
        Ok(())
    }

    /// Run every emit hook for a finalized block, in registration order.
    pub async fn emit_block(
        &self,
        req: &FinalizeBlockRequest,
        res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError> {
        for indexer in &self.indexers {
            if let Err(e) = indexer.emit_module_events(req, res).await {
                warn!(
                    module = indexer.module_name(),
                    height = req.height,
                    error = %e,
                    "module emit hook failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Search through the named module.
    pub async fn search_txs(
        &self,
        module: &str,
        query: &Query,
        limit: u16,
    ) -> Result<TxSearchResult, IndexerError> {
        match self.get(module) {
            Some(indexer) => indexer.search_txs(query, limit).await,
            None => Err(IndexerError::UnknownModule {
                name: module.to_string(),
            }),
        }
    }
}
