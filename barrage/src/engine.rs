//! Plan file in, finished run out.

use anyhow::{Context, Result};
use barrage_context::{FlowContext, SharedContext, StepSummary, VarScope};
use barrage_core::{FlowPlan, RequestExecutor};
use barrage_logger::Logger;
use barrage_runtime::{EngineConfig, FlowOrchestrator};
use barrage_yaml::{build_plan, PlanLeafRunner, PlanLoader};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct Engine {
    config: EngineConfig,
    executor: Arc<dyn RequestExecutor>,
    context: SharedContext,
}

impl Engine {
    /// Engine sending requests through reqwest, configured by
    /// `config.http`.
    #[cfg(feature = "http")]
    pub fn new(config: EngineConfig) -> Result<Self> {
        let executor = barrage_runtime::ReqwestExecutor::new(&config.http)
            .context("failed to build HTTP client")?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    pub fn with_executor(config: EngineConfig, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            config,
            executor,
            context: Arc::new(Mutex::new(FlowContext::default())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Per-item state log of the runs made by this engine.
    pub fn context(&self) -> SharedContext {
        Arc::clone(&self.context)
    }

    /// Loads the plan at `path` and runs it. Leaf paths are resolved
    /// against the plan's directory.
    pub async fn run_file(
        &self,
        path: impl AsRef<Path>,
        scope: VarScope,
        cancel: CancellationToken,
    ) -> Result<StepSummary> {
        let path = path.as_ref();
        let config = PlanLoader::from_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let plan = build_plan(&config, base_dir)
            .with_context(|| format!("invalid execution plan {path:?}"))?;
        self.run_plan(&plan, scope, cancel).await
    }

    /// Runs an already built plan. Every leaf document is loaded and
    /// validated before the first request is sent.
    pub async fn run_plan(
        &self,
        plan: &FlowPlan,
        scope: VarScope,
        cancel: CancellationToken,
    ) -> Result<StepSummary> {
        let runner = PlanLeafRunner::new(Arc::clone(&self.executor))
            .write_output(self.config.write_output)
            .preload(plan)?;
        let orchestrator = FlowOrchestrator::with_context(Arc::new(runner), self.context());

        let result = orchestrator
            .run(
                plan,
                &self.config.output_root,
                scope,
                self.config.concurrency,
                cancel,
            )
            .await;

        let ctx = self.context.lock().await;
        let logger = Logger::with_trace_id(ctx.trace_id.clone());
        logger.log_run_summary(&ctx);
        result.map(|()| ctx.summary())
    }
}
