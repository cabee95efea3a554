use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<P::Output> {
        let name = self.pipeline.name();
        let started = Instant::now();
        tracing::info!("🚀 Starting {} pipeline", name);

        tracing::debug!("{}: extracting", name);
        let extracted = self.pipeline.extract().await.inspect_err(|e| {
            tracing::error!("{}: extract failed: {}", name, e);
        })?;

        tracing::debug!("{}: transforming", name);
        let transformed = self.pipeline.transform(extracted).await.inspect_err(|e| {
            tracing::error!("{}: transform failed: {}", name, e);
        })?;

        tracing::debug!("{}: loading", name);
        let output = self.pipeline.load(transformed).await.inspect_err(|e| {
            tracing::error!("{}: load failed: {}", name, e);
        })?;

        tracing::info!("✅ {} pipeline finished in {:?}", name, started.elapsed());
        Ok(output)
    }
}
