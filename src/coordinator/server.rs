//! Coordinator server

use crate::common::serve::serve_router;
use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::service::CoordinatorService;
use std::sync::Arc;

pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Fresh tables, or the configured snapshot when one exists on disk
    pub fn build_service(&self) -> Result<Arc<CoordinatorService>> {
        let service = CoordinatorService::new(self.config.sweep_interval());

        match &self.config.snapshot_path {
            Some(path) if path.exists() => {
                service.load_snapshot(path)?;
            }
            Some(path) => {
                tracing::info!("No snapshot at {}, starting empty", path.display());
            }
            None => {}
        }

        Ok(Arc::new(service))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting coordinator");
        tracing::info!("  RPC API: {}", self.config.bind_addr);
        tracing::info!("  Sweep interval: {:?}", self.config.sweep_interval());
        if let Some(path) = &self.config.snapshot_path {
            tracing::info!("  Snapshot: {}", path.display());
        }

        let service = self.build_service()?;
        let router = create_router(CoordState {
            service: service.clone(),
        });

        tracing::info!("✓ Coordinator ready");
        serve_router(self.config.bind_addr, self.config.tls.as_ref(), router).await?;

        if let Some(path) = &self.config.snapshot_path {
            service.persist_snapshot(path)?;
        }
        tracing::info!("Coordinator stopped");
        Ok(())
    }
}
