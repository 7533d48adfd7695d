//! Plan-driven [`LeafRunner`]: loads the leaf document of a `file` node
//! and runs its requests as mass executions.

use crate::expression::Interpolator;
use crate::loader::PlanLoader;
use crate::parser::{parse_leaf, LeafPlan};
use crate::template::TemplateRequestFactory;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use barrage_context::VarScope;
use barrage_core::{
    Authenticator, FlowKind, FlowNode, FlowPlan, FlowWorkItem, LeafOutcome, LeafRunner,
    RecordWriter, RequestExecutor, TerminationKind,
};
use barrage_runtime::{
    BearerAuth, Collaborators, JsonLinesWriter, MassExecution, NoAuth, NoopWriter,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Reads and compiles one leaf document.
pub fn load_leaf(path: &Path) -> Result<LeafPlan> {
    let config = PlanLoader::leaf_from_file(path)?;
    parse_leaf(&config).with_context(|| format!("invalid leaf document {path:?}"))
}

pub struct PlanLeafRunner {
    executor: Arc<dyn RequestExecutor>,
    leaves: HashMap<PathBuf, Arc<LeafPlan>>,
    write_output: bool,
}

impl PlanLeafRunner {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            leaves: HashMap::new(),
            write_output: true,
        }
    }

    /// `false` replaces every record writer with a no-op sink.
    pub fn write_output(mut self, enabled: bool) -> Self {
        self.write_output = enabled;
        self
    }

    /// Loads and compiles every leaf referenced by `plan`, so a broken
    /// document fails the run before anything is fired.
    pub fn preload(mut self, plan: &FlowPlan) -> Result<Self> {
        let mut files = Vec::new();
        collect_files(&plan.flows, &mut files);
        for file in files {
            if self.leaves.contains_key(&file) {
                continue;
            }
            let leaf = load_leaf(&file)?;
            tracing::debug!(file = ?file, requests = leaf.requests.len(), "leaf document loaded");
            self.leaves.insert(file, Arc::new(leaf));
        }
        Ok(self)
    }

    fn leaf(&self, path: &Path) -> Result<Arc<LeafPlan>> {
        match self.leaves.get(path) {
            Some(leaf) => Ok(Arc::clone(leaf)),
            None => load_leaf(path).map(Arc::new),
        }
    }

    fn writer(&self, leaf: &LeafPlan, dir: &Path, name: &str) -> Arc<dyn RecordWriter> {
        if self.write_output && leaf.output.enabled {
            Arc::new(JsonLinesWriter::in_dir(dir, name))
        } else {
            Arc::new(NoopWriter)
        }
    }
}

fn collect_files(nodes: &[Arc<FlowNode>], files: &mut Vec<PathBuf>) {
    for node in nodes {
        match &node.kind {
            FlowKind::File { file } => files.push(file.clone()),
            FlowKind::Flow { children, .. } => collect_files(children, files),
        }
    }
}

fn authenticator(leaf: &LeafPlan, scope: &VarScope) -> Result<Arc<dyn Authenticator>> {
    match &leaf.auth {
        Some(auth) if auth.auth_type.eq_ignore_ascii_case("bearer") => {
            let token = auth.token.as_deref().unwrap_or_default();
            let token = Interpolator::new()?
                .interpolate(token, scope)
                .context("failed to resolve bearer token")?;
            Ok(Arc::new(BearerAuth::new(token)?))
        }
        _ => Ok(Arc::new(NoAuth)),
    }
}

#[async_trait]
impl LeafRunner for PlanLeafRunner {
    #[tracing::instrument(level = "info", skip(self, item, cancel), fields(item = %item.name))]
    async fn run_leaf(&self, item: &FlowWorkItem, cancel: CancellationToken) -> Result<LeafOutcome> {
        let FlowKind::File { file } = &item.node.kind else {
            bail!("work item `{}` is not a leaf", item.name);
        };
        let leaf = self.leaf(file)?;
        let auth = authenticator(&leaf, &item.scope)?;
        let output_dir = match &leaf.output.dir {
            Some(dir) => item.output_dir.join(dir),
            None => item.output_dir.clone(),
        };

        let mut executions = Vec::with_capacity(leaf.requests.len());
        for request in &leaf.requests {
            let collaborators = Collaborators {
                factory: Arc::new(TemplateRequestFactory::new(
                    Arc::clone(&request.template),
                    item.scope.clone(),
                )),
                executor: Arc::clone(&self.executor),
                auth: Arc::clone(&auth),
                writer: self.writer(&leaf, &output_dir, &request.name),
            };
            let execution = MassExecution::new(&request.name, request.policy.clone(), collaborators)?;
            executions.push(Arc::new(execution));
        }

        run_concurrently(executions, cancel).await
    }
}

/// Runs every execution on its own task. The first failure cancels the
/// others; all of them are awaited before returning. The leaf counts as
/// cancelled when any request stopped on `context`.
async fn run_concurrently(
    executions: Vec<Arc<MassExecution>>,
    cancel: CancellationToken,
) -> Result<LeafOutcome> {
    let scope = cancel.child_token();
    let mut set = JoinSet::new();
    for execution in executions {
        let token = scope.clone();
        set.spawn(async move {
            let report = execution.run_to_verdict(&token).await;
            (execution.name().to_string(), report)
        });
    }

    let mut first_error: Option<anyhow::Error> = None;
    let mut outcome = LeafOutcome::Completed;
    while let Some(joined) = set.join_next().await {
        let failure = match joined {
            Ok((name, Ok(report))) => {
                tracing::info!(
                    request = %name,
                    outcome = %report.outcome,
                    attempts = report.stats.attempts,
                    written = report.stats.written,
                    excluded = report.stats.excluded,
                    "request finished"
                );
                if report.outcome.kind == TerminationKind::Context {
                    outcome = LeafOutcome::Cancelled;
                }
                continue;
            }
            Ok((_, Err(e))) => e,
            Err(e) => anyhow!("request task failed: {e}"),
        };
        if first_error.is_none() {
            tracing::warn!(error = %format!("{failure:#}"), "request failed, cancelling siblings");
            scope.cancel();
            first_error = Some(failure);
        } else {
            tracing::debug!(error = %format!("{failure:#}"), "additional request failure");
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}
