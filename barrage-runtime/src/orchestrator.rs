//! Flow orchestrator.
//!
//! Expands each level of the flow tree into work items and runs them
//! sequentially, through a bounded worker pool or all at once. Every level
//! owns a child cancellation token; the first failing item cancels its
//! level, the remaining siblings are still awaited, and the failure is
//! reported upward.

use anyhow::{Context, Result};
use barrage_context::{FlowContext, SharedContext, VarScope};
use barrage_core::{
    expand, Concurrency, FlowNode, FlowPlan, FlowWorkItem, LeafOutcome, LeafRunner,
};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct FlowOrchestrator {
    runner: Arc<dyn LeafRunner>,
    context: SharedContext,
}

impl FlowOrchestrator {
    pub fn new(runner: Arc<dyn LeafRunner>) -> Self {
        Self::with_context(runner, Arc::new(Mutex::new(FlowContext::default())))
    }

    pub fn with_context(runner: Arc<dyn LeafRunner>, context: SharedContext) -> Self {
        Self { runner, context }
    }

    pub fn context(&self) -> SharedContext {
        Arc::clone(&self.context)
    }

    /// Runs the whole plan. `concurrency` overrides the plan's root
    /// directive when given.
    #[tracing::instrument(level = "info", skip_all, fields(flows = plan.flows.len(), output = %output_root.display()))]
    pub async fn run(
        &self,
        plan: &FlowPlan,
        output_root: &Path,
        scope: VarScope,
        concurrency: Option<Concurrency>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let concurrency = concurrency.unwrap_or(plan.concurrency);
        {
            let ctx = self.context.lock().await;
            tracing::info!(trace_id = %ctx.trace_id, ?concurrency, "starting flow plan");
        }
        self.run_level(
            plan.flows.clone(),
            concurrency,
            output_root.to_path_buf(),
            scope,
            String::new(),
            cancel,
        )
        .await?;
        Ok(())
    }

    fn run_level(
        &self,
        nodes: Vec<Arc<FlowNode>>,
        concurrency: Concurrency,
        dir: PathBuf,
        scope: VarScope,
        parent_name: String,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<LeafOutcome>> {
        let this = self.clone();
        Box::pin(async move {
            let items = expand(&nodes, &dir, &scope, &parent_name);
            {
                let mut ctx = this.context.lock().await;
                for item in &items {
                    ctx.register_step(item.name.clone());
                }
            }

            let level = cancel.child_token();
            tracing::debug!(level = %parent_name, items = items.len(), ?concurrency, "running level");
            match concurrency {
                Concurrency::Sequential => this.run_sequential(items, level).await,
                Concurrency::Bounded(_) => {
                    let width = concurrency.width(items.len());
                    this.run_parallel(items, Some(Arc::new(Semaphore::new(width))), level)
                        .await
                }
                Concurrency::Unbounded => this.run_parallel(items, None, level).await,
            }
        })
    }

    async fn run_sequential(
        &self,
        items: Vec<FlowWorkItem>,
        level: CancellationToken,
    ) -> Result<LeafOutcome> {
        let mut outcome = LeafOutcome::Completed;
        let mut items = items.into_iter();
        while let Some(item) = items.next() {
            if level.is_cancelled() {
                self.mark_cancelled(std::iter::once(item).chain(items)).await;
                return Ok(LeafOutcome::Cancelled);
            }
            match self.run_item(item, level.clone()).await {
                Ok(LeafOutcome::Completed) => {}
                Ok(LeafOutcome::Cancelled) => outcome = LeafOutcome::Cancelled,
                Err(e) => {
                    level.cancel();
                    self.mark_cancelled(items).await;
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    async fn run_parallel(
        &self,
        items: Vec<FlowWorkItem>,
        permits: Option<Arc<Semaphore>>,
        level: CancellationToken,
    ) -> Result<LeafOutcome> {
        let mut workers = JoinSet::new();
        for item in items {
            let this = self.clone();
            let permits = permits.clone();
            let level = level.clone();
            workers.spawn(async move {
                let _permit = match permits {
                    Some(permits) => tokio::select! {
                        biased;
                        _ = level.cancelled() => None,
                        permit = permits.acquire_owned() => Some(
                            permit.context("worker pool closed")?,
                        ),
                    },
                    None => None,
                };
                if level.is_cancelled() {
                    this.mark_cancelled(std::iter::once(item)).await;
                    return Ok(LeafOutcome::Cancelled);
                }
                this.run_item(item, level).await
            });
        }

        let mut first_error = None;
        let mut outcome = LeafOutcome::Completed;
        while let Some(joined) = workers.join_next().await {
            let result = joined
                .map_err(|e| anyhow::anyhow!("work item task failed: {e}"))
                .and_then(|r| r);
            match result {
                Ok(LeafOutcome::Completed) => {}
                Ok(LeafOutcome::Cancelled) => outcome = LeafOutcome::Cancelled,
                Err(e) if first_error.is_none() => {
                    tracing::warn!(error = %format!("{e:#}"), "cancelling siblings after failure");
                    level.cancel();
                    first_error = Some(e);
                }
                Err(e) => {
                    tracing::debug!(error = %format!("{e:#}"), "additional sibling failure");
                }
            }
        }
        first_error.map_or(Ok(outcome), Err)
    }

    /// The recorded status follows what the item reports, not the state
    /// of `cancel` once it has returned.
    async fn run_item(&self, item: FlowWorkItem, cancel: CancellationToken) -> Result<LeafOutcome> {
        self.context.lock().await.start_step(&item.name);

        let result = self.execute_item(&item, &cancel).await;

        let mut ctx = self.context.lock().await;
        match result {
            Ok(LeafOutcome::Cancelled) => {
                ctx.end_step_cancelled(&item.name);
                Ok(LeafOutcome::Cancelled)
            }
            Ok(LeafOutcome::Completed) => {
                ctx.end_step_success(&item.name);
                Ok(LeafOutcome::Completed)
            }
            Err(e) => {
                ctx.end_step_failed(&item.name, &format!("{e:#}"));
                Err(e.context(format!("flow item `{}` failed", item.name)))
            }
        }
    }

    async fn execute_item(&self, item: &FlowWorkItem, cancel: &CancellationToken) -> Result<LeafOutcome> {
        if item.node.mkdir {
            tokio::fs::create_dir_all(&item.output_dir)
                .await
                .with_context(|| format!("failed to create {}", item.output_dir.display()))?;
        }
        match item.children() {
            Some((children, concurrency)) => {
                self.run_level(
                    children.to_vec(),
                    concurrency,
                    item.output_dir.clone(),
                    item.inherited.clone(),
                    item.name.clone(),
                    cancel.clone(),
                )
                .await
            }
            None => self.runner.run_leaf(item, cancel.clone()).await,
        }
    }

    async fn mark_cancelled(&self, items: impl Iterator<Item = FlowWorkItem>) {
        let mut ctx = self.context.lock().await;
        for item in items {
            ctx.end_step_cancelled(&item.name);
        }
    }
}
