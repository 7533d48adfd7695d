//! Turns loaded documents into executable parts.
//!
//! Everything that can be rejected is rejected here, before any attempt
//! is fired: node shapes, condition operators and queries, termination
//! names, intervals and caps.

use crate::config::{
    AuthConfig, BodyConditionConfig, FlowConfig, FlowType, IntConditionConfig, LeafConfig,
    OutputConfig, PlanConfig, RequestConfig,
};
use crate::template::RequestTemplate;
use anyhow::{Context, Result};
use barrage_core::{
    BodyCondition, BreakPolicy, Concurrency, DataColumn, FlowNode, FlowPlan, IntCondition,
    PacingPolicy, PlanError, RecordExcludeFilter, SuccessBreak, DEFAULT_INTERVAL,
};
use barrage_runtime::{Correlator, MassPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Builds the flow tree. Relative `file` paths are resolved against
/// `base_dir`.
pub fn build_plan(config: &PlanConfig, base_dir: &Path) -> Result<FlowPlan, PlanError> {
    let flows = config
        .flows
        .iter()
        .map(|node| build_node(node, base_dir))
        .collect::<Result<Vec<_>, _>>()?;
    FlowPlan::new(Concurrency::from_directive(config.concurrency), flows)
}

fn build_node(config: &FlowConfig, base_dir: &Path) -> Result<FlowNode, PlanError> {
    let context = format!("node `{}`", config.id);
    let node = match config.flow_type {
        FlowType::File => {
            let file = config
                .file
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| PlanError::MissingField {
                    field: "file",
                    context: context.clone(),
                })?;
            FlowNode::file(&config.id, base_dir.join(file))
        }
        FlowType::Flow => {
            if config.flows.is_empty() {
                return Err(PlanError::MissingField {
                    field: "flows",
                    context,
                });
            }
            let children = config
                .flows
                .iter()
                .map(|child| build_node(child, base_dir))
                .collect::<Result<Vec<_>, _>>()?;
            FlowNode::flow(
                &config.id,
                children,
                Concurrency::from_directive(config.concurrency),
            )
        }
    };

    let mut node = node.count(config.count).mkdir(config.mkdir);
    node.values = config
        .values
        .iter()
        .map(|b| (b.key.clone(), b.value.clone()))
        .collect();
    node.thread_only_values = config
        .thread_only_values
        .iter()
        .map(|b| (b.key.clone(), b.value.clone()))
        .collect();
    Ok(node)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// Every request runs concurrently; the first failure cancels the rest.
    Mass,
    /// One request, one attempt.
    One,
}

/// One request of a leaf document, ready to be wired to collaborators.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub name: String,
    pub template: Arc<RequestTemplate>,
    pub policy: MassPolicy,
}

#[derive(Debug, Clone)]
pub struct LeafPlan {
    pub kind: LeafKind,
    pub requests: Vec<RequestPlan>,
    pub output: OutputConfig,
    pub auth: Option<AuthConfig>,
}

/// Validates a leaf document and compiles its policies.
pub fn parse_leaf(config: &LeafConfig) -> Result<LeafPlan> {
    let kind = match config.leaf_type.as_str() {
        "MassExecute" => LeafKind::Mass,
        "OneExecute" => LeafKind::One,
        other => return Err(PlanError::UnknownLeafType(other.to_string()).into()),
    };

    let requests = match kind {
        LeafKind::Mass => {
            if config.requests.is_empty() {
                return Err(PlanError::MissingField {
                    field: "requests",
                    context: "MassExecute document".to_string(),
                }
                .into());
            }
            let mut seen = std::collections::HashSet::new();
            let mut requests = Vec::with_capacity(config.requests.len());
            for (index, request) in config.requests.iter().enumerate() {
                let plan = parse_request(request, index, kind)?;
                if !seen.insert(plan.name.clone()) {
                    return Err(PlanError::DuplicateId(plan.name).into());
                }
                requests.push(plan);
            }
            requests
        }
        LeafKind::One => {
            let request = config.request.as_ref().ok_or_else(|| PlanError::MissingField {
                field: "request",
                context: "OneExecute document".to_string(),
            })?;
            vec![parse_request(request, 0, kind)?]
        }
    };

    if let Some(auth) = &config.auth {
        match auth.auth_type.to_ascii_lowercase().as_str() {
            "none" => {}
            "bearer" if auth.token.as_deref().is_some_and(|t| !t.is_empty()) => {}
            "bearer" => {
                return Err(PlanError::MissingField {
                    field: "token",
                    context: "bearer auth".to_string(),
                }
                .into())
            }
            other => {
                return Err(PlanError::InvalidField {
                    field: "auth",
                    context: "leaf document".to_string(),
                    reason: format!("unsupported auth type `{other}`"),
                }
                .into())
            }
        }
    }

    Ok(LeafPlan {
        kind,
        requests,
        output: config.output.clone(),
        auth: config.auth.clone(),
    })
}

fn parse_request(config: &RequestConfig, index: usize, kind: LeafKind) -> Result<RequestPlan> {
    let name = config
        .id
        .clone()
        .unwrap_or_else(|| format!("request_{index}"));
    let context = format!("request `{name}`");
    let template = RequestTemplate::from_config(config, &context)?;

    let interval = match config.interval {
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_INTERVAL,
    };
    let mut break_policy = BreakPolicy {
        time: config.break_config.time.map(Duration::from_millis),
        count: config.break_config.count,
        sys_error: config.break_config.sys_error,
        parse_error: config.break_config.parse_error,
        write_error: config.break_config.write_error,
        status_code: int_conditions(&config.break_config.status_code),
        response_body: body_conditions(&config.break_config.response_body),
    };
    let mut success_break = config
        .success_break
        .iter()
        .map(|s| s.parse::<SuccessBreak>())
        .collect::<Result<Vec<_>, _>>()?;

    if kind == LeafKind::One {
        break_policy.count = Some(1);
        break_policy.sys_error = true;
        break_policy.parse_error = true;
        break_policy.write_error = true;
        let count: SuccessBreak = "count".parse()?;
        if !success_break.contains(&count) {
            success_break.push(count);
        }
    }

    let pacing = PacingPolicy::new(interval, config.await_prev_response, break_policy.count)
        .map_err(|e| match e {
            PlanError::InvalidField { field, reason, .. } => PlanError::InvalidField {
                field,
                context: context.clone(),
                reason,
            },
            other => other,
        })?;
    let exclude = RecordExcludeFilter {
        count: int_conditions(&config.record_exclude_filter.count),
        status_code: int_conditions(&config.record_exclude_filter.status_code),
        response_body: body_conditions(&config.record_exclude_filter.response_body),
    };
    let data: Vec<DataColumn> = config
        .data
        .iter()
        .map(|d| DataColumn {
            name: d.name.clone(),
            query: d.query.clone(),
        })
        .collect();

    // compile once so bad operators and queries surface now
    Correlator::new(&break_policy, &exclude, &data).with_context(|| context.clone())?;

    Ok(RequestPlan {
        name,
        template: Arc::new(template),
        policy: MassPolicy {
            pacing,
            break_policy,
            exclude,
            data,
            success_break,
        },
    })
}

fn int_conditions(configs: &[IntConditionConfig]) -> Vec<IntCondition> {
    configs
        .iter()
        .map(|c| {
            let value = c
                .value
                .as_ref()
                .map(|v| v.to_interpolated_string())
                .unwrap_or_default();
            IntCondition::new(&c.id, &c.op, value)
        })
        .collect()
}

fn body_conditions(configs: &[BodyConditionConfig]) -> Vec<BodyCondition> {
    configs
        .iter()
        .map(|c| BodyCondition::new(&c.id, &c.query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PlanLoader;
    use barrage_core::{FlowKind, TerminationKind};

    fn leaf(yaml: &str) -> Result<LeafPlan> {
        parse_leaf(&PlanLoader::leaf_from_yaml_str(yaml).unwrap())
    }

    #[test]
    fn test_build_plan_resolves_files() {
        let config = PlanLoader::from_yaml_str(
            r#"
concurrency: 2
flows:
  - id: a
    file: leaves/a.yaml
  - id: group
    type: flow
    flows:
      - { id: b, file: b.yaml, count: 2 }
"#,
        )
        .unwrap();
        let plan = build_plan(&config, Path::new("/plans")).unwrap();

        assert_eq!(plan.concurrency, Concurrency::from_directive(2));
        assert_eq!(
            plan.flows[0].kind,
            FlowKind::File {
                file: "/plans/leaves/a.yaml".into()
            }
        );
        let FlowKind::Flow { children, concurrency } = &plan.flows[1].kind else {
            panic!("expected nested flow");
        };
        assert_eq!(*concurrency, Concurrency::Sequential);
        assert_eq!(children[0].count, 2);
    }

    #[test]
    fn test_build_plan_rejects_bad_nodes() {
        let missing_file = PlanLoader::from_yaml_str("flows: [{ id: a }]").unwrap();
        assert!(matches!(
            build_plan(&missing_file, Path::new(".")),
            Err(PlanError::MissingField { field: "file", .. })
        ));

        let empty_flow = PlanLoader::from_yaml_str("flows: [{ id: a, type: flow }]").unwrap();
        assert!(matches!(
            build_plan(&empty_flow, Path::new(".")),
            Err(PlanError::MissingField { field: "flows", .. })
        ));

        let zero = PlanLoader::from_yaml_str("flows: [{ id: a, file: a.yaml, count: 0 }]").unwrap();
        assert!(build_plan(&zero, Path::new(".")).is_err());

        let dup = PlanLoader::from_yaml_str(
            "flows: [{ id: a, file: a.yaml }, { id: a, file: b.yaml }]",
        )
        .unwrap();
        assert!(matches!(
            build_plan(&dup, Path::new(".")),
            Err(PlanError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_parse_mass_leaf() {
        let plan = leaf(
            r#"
type: MassExecute
requests:
  - id: list
    target: http://h
    interval: 20
    successBreak: [count, statusCode/5xx]
    break:
      count: 4
      time: 1500
      statusCode:
        - { id: 5xx, op: between, value: "500,599" }
    data:
      - { name: total, query: $.meta.total }
  - target: http://h
    endpoint: /other
"#,
        )
        .unwrap();

        assert_eq!(plan.kind, LeafKind::Mass);
        let list = &plan.requests[0];
        assert_eq!(list.name, "list");
        assert_eq!(list.policy.pacing.interval, Duration::from_millis(20));
        assert_eq!(list.policy.pacing.count, Some(4));
        assert_eq!(list.policy.break_policy.time, Some(Duration::from_millis(1500)));
        assert_eq!(list.policy.success_break.len(), 2);
        assert_eq!(list.policy.success_break[1].kind, TerminationKind::StatusCode);
        assert_eq!(list.policy.data[0].name, "total");
        assert_eq!(plan.requests[1].name, "request_1");
        assert_eq!(plan.requests[1].policy.pacing.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_parse_one_leaf_forces_single_attempt() {
        let plan = leaf("type: OneExecute\nrequest: { target: http://h }").unwrap();
        let policy = &plan.requests[0].policy;
        assert_eq!(plan.kind, LeafKind::One);
        assert_eq!(policy.pacing.count, Some(1));
        assert!(policy.break_policy.sys_error);
        assert!(policy.break_policy.parse_error);
        assert!(policy.break_policy.write_error);
        assert_eq!(policy.success_break[0].kind, TerminationKind::Count);
    }

    #[test]
    fn test_construction_errors() {
        let unknown = leaf("type: Replay\nrequests: []").unwrap_err();
        assert!(matches!(
            unknown.downcast_ref::<PlanError>(),
            Some(PlanError::UnknownLeafType(t)) if t == "Replay"
        ));

        let bad_op = leaf(
            "type: MassExecute\nrequests: [{ target: http://h, break: { statusCode: [{ id: x, op: approx, value: 1 }] } }]",
        )
        .unwrap_err();
        assert!(bad_op
            .chain()
            .any(|e| matches!(e.downcast_ref::<PlanError>(), Some(PlanError::UnknownOperator { .. }))));

        let bad_break = leaf("type: MassExecute\nrequests: [{ target: http://h, successBreak: [sometimes] }]");
        assert!(bad_break.is_err());

        let zero_interval = leaf("type: MassExecute\nrequests: [{ target: http://h, interval: 0 }]");
        assert!(zero_interval.is_err());

        let dup = leaf("type: MassExecute\nrequests: [{ id: a, target: http://h }, { id: a, target: http://h }]");
        assert!(dup.is_err());

        let no_token = leaf("type: OneExecute\nrequest: { target: http://h }\nauth: { type: bearer }");
        assert!(no_token.is_err());
    }
}
