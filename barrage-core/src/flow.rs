//! Flow tree and its expansion into work items.

use crate::error::PlanError;
use barrage_context::{Value, VarScope};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How siblings of one level are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// Item `i + 1` starts only after item `i` finished.
    #[default]
    Sequential,
    /// At most `n` items in flight.
    Bounded(NonZeroUsize),
    /// Every item dispatched at once.
    Unbounded,
}

impl Concurrency {
    /// `0` is sequential, a positive value bounds the worker pool and a
    /// negative value runs everything in parallel.
    pub fn from_directive(directive: i64) -> Self {
        match directive {
            0 => Concurrency::Sequential,
            n if n < 0 => Concurrency::Unbounded,
            n => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Concurrency::Bounded)
                .unwrap_or(Concurrency::Unbounded),
        }
    }

    /// Number of workers needed for `items` work items.
    pub fn width(self, items: usize) -> usize {
        match self {
            Concurrency::Sequential => 1,
            Concurrency::Bounded(n) => n.get().min(items.max(1)),
            Concurrency::Unbounded => items.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowKind {
    /// A leaf execution described by a separate document.
    File { file: PathBuf },
    /// A nested sub-tree with its own concurrency directive.
    Flow {
        children: Vec<Arc<FlowNode>>,
        concurrency: Concurrency,
    },
}

/// One node of the operator's execution tree. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub kind: FlowKind,
    pub count: u32,
    pub mkdir: bool,
    /// Bindings inherited by nested flows.
    pub values: Vec<(String, Value)>,
    /// Bindings visible to this node's own work items only.
    pub thread_only_values: Vec<(String, Value)>,
}

impl FlowNode {
    pub fn file(id: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self::with_kind(id.into(), FlowKind::File { file: file.into() })
    }

    pub fn flow(
        id: impl Into<String>,
        children: Vec<FlowNode>,
        concurrency: Concurrency,
    ) -> Self {
        Self::with_kind(
            id.into(),
            FlowKind::Flow {
                children: children.into_iter().map(Arc::new).collect(),
                concurrency,
            },
        )
    }

    fn with_kind(id: String, kind: FlowKind) -> Self {
        Self {
            id,
            kind,
            count: 1,
            mkdir: false,
            values: Vec::new(),
            thread_only_values: Vec::new(),
        }
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn mkdir(mut self, mkdir: bool) -> Self {
        self.mkdir = mkdir;
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn thread_only_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.thread_only_values.push((key.into(), value.into()));
        self
    }
}

/// Root of an execution plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowPlan {
    pub concurrency: Concurrency,
    pub flows: Vec<Arc<FlowNode>>,
}

impl FlowPlan {
    pub fn new(concurrency: Concurrency, flows: Vec<FlowNode>) -> Result<Self, PlanError> {
        let flows: Vec<Arc<FlowNode>> = flows.into_iter().map(Arc::new).collect();
        validate_siblings(&flows, "plan")?;
        Ok(Self { concurrency, flows })
    }
}

/// Checks counts, sibling id uniqueness and non-empty nested flows,
/// recursively.
pub fn validate_siblings(nodes: &[Arc<FlowNode>], context: &str) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.id.is_empty() {
            return Err(PlanError::MissingField {
                field: "id",
                context: context.to_string(),
            });
        }
        if !seen.insert(node.id.as_str()) {
            return Err(PlanError::DuplicateId(format!("{}/{}", context, node.id)));
        }
        if node.count == 0 {
            return Err(PlanError::InvalidField {
                field: "count",
                context: format!("flow `{}`", node.id),
                reason: "count must be at least 1".to_string(),
            });
        }
        match &node.kind {
            FlowKind::File { file } if file.as_os_str().is_empty() => {
                return Err(PlanError::MissingField {
                    field: "file",
                    context: format!("flow `{}`", node.id),
                });
            }
            FlowKind::Flow { children, .. } if children.is_empty() => {
                return Err(PlanError::MissingField {
                    field: "flows",
                    context: format!("flow `{}`", node.id),
                });
            }
            FlowKind::Flow { children, .. } => {
                validate_siblings(children, &format!("{}/{}", context, node.id))?;
            }
            FlowKind::File { .. } => {}
        }
    }
    Ok(())
}

/// A node bound to one iteration, ready to be scheduled.
#[derive(Debug, Clone)]
pub struct FlowWorkItem {
    pub node: Arc<FlowNode>,
    pub iteration: u32,
    pub output_dir: PathBuf,
    /// Everything the item itself sees.
    pub scope: VarScope,
    /// What nested children are seeded from; excludes thread-only values.
    pub inherited: VarScope,
    /// Path-like display name, e.g. `outer#0/a#1`.
    pub name: String,
}

impl FlowWorkItem {
    pub fn children(&self) -> Option<(&[Arc<FlowNode>], Concurrency)> {
        match &self.node.kind {
            FlowKind::Flow {
                children,
                concurrency,
            } => Some((children.as_slice(), *concurrency)),
            FlowKind::File { .. } => None,
        }
    }
}

/// Expands sibling nodes into a flat list of work items, nodes in order,
/// iterations in order. Each item gets a private fork of `parent`.
pub fn expand(
    nodes: &[Arc<FlowNode>],
    parent_dir: &Path,
    parent: &VarScope,
    parent_name: &str,
) -> Vec<FlowWorkItem> {
    let mut items = Vec::new();
    for node in nodes {
        for iteration in 0..node.count {
            let output_dir = if node.mkdir {
                parent_dir.join(format!("{}_{}", node.id, iteration))
            } else {
                parent_dir.to_path_buf()
            };
            let inherited = parent.fork().extend(node.values.iter().cloned());
            let scope = inherited
                .fork()
                .extend(node.thread_only_values.iter().cloned())
                .with("iteration", i64::from(iteration));
            let name = if parent_name.is_empty() {
                format!("{}#{}", node.id, iteration)
            } else {
                format!("{}/{}#{}", parent_name, node.id, iteration)
            };
            items.push(FlowWorkItem {
                node: Arc::clone(node),
                iteration,
                output_dir,
                scope,
                inherited,
                name,
            });
        }
    }
    items
}
