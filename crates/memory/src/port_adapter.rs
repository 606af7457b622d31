use async_trait::async_trait;
use turnkeep_tools::ports::{
    MemoryAddRequest, MemoryForgetRequest, MemoryPort, MemoryPortError, MemoryPromoteRequest,
    MemorySearchRequest, MemoryUpdateRequest,
};

use crate::engine::MemoryEngine;

/// Adapts [`MemoryEngine`] to the `memory` tool's [`MemoryPort`] interface.
/// The composition root builds one of these and hands it to `MemoryTool` as
/// an `Arc<dyn MemoryPort>`.
pub struct MemoryPortAdapter {
    engine: MemoryEngine,
}

impl MemoryPortAdapter {
    pub fn new(engine: MemoryEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MemoryPort for MemoryPortAdapter {
    async fn add(&self, req: MemoryAddRequest) -> Result<String, MemoryPortError> {
        self.engine.add(req).await
    }
    async fn search(&self, req: MemorySearchRequest) -> Result<String, MemoryPortError> {
        self.engine.search(req).await
    }
    async fn update(&self, req: MemoryUpdateRequest) -> Result<String, MemoryPortError> {
        self.engine.update(req).await
    }
    async fn promote(&self, req: MemoryPromoteRequest) -> Result<String, MemoryPortError> {
        self.engine.promote(req).await
    }
    async fn forget(&self, req: MemoryForgetRequest) -> Result<String, MemoryPortError> {
        self.engine.forget(req).await
    }
}
