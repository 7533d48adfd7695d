//! Request templates rendered once per attempt.

use crate::config::RequestConfig;
use crate::expression::Interpolator;
use anyhow::{Context, Result};
use barrage_context::VarScope;
use barrage_core::{
    ExecutionRequest, HttpMethod, MultipartField, PlanError, RequestBody, RequestFactory,
    ResponseType,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum BodyTemplate {
    Empty,
    Json(JsonValue),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartField>),
}

/// A request as written in a leaf document, with `${..}` references left
/// unresolved.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: HttpMethod,
    target: String,
    endpoint: String,
    query: Vec<(String, String)>,
    path_variables: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: BodyTemplate,
    response_type: ResponseType,
    interpolator: Interpolator,
}

impl RequestTemplate {
    pub fn from_config(config: &RequestConfig, context: &str) -> Result<Self> {
        if config.target.trim().is_empty() {
            return Err(PlanError::MissingField {
                field: "target",
                context: context.to_string(),
            }
            .into());
        }
        let method: HttpMethod = config.method.parse().map_err(|e| recontext(e, context))?;
        let response_type = match &config.response_type {
            Some(kind) => kind.parse().map_err(|e| recontext(e, context))?,
            None => ResponseType::default(),
        };
        let body = parse_body(config, context)?;

        Ok(Self {
            method,
            target: config.target.clone(),
            endpoint: config.endpoint.clone(),
            query: pairs(&config.query_param),
            path_variables: pairs(&config.path_variables),
            headers: pairs(&config.headers),
            body,
            response_type,
            interpolator: Interpolator::new()?,
        })
    }

    /// Resolves every reference against `scope`.
    pub fn render(&self, scope: &VarScope) -> Result<ExecutionRequest> {
        let interp = &self.interpolator;
        let render_pairs = |pairs: &[(String, String)]| -> Result<Vec<(String, String)>> {
            pairs
                .iter()
                .map(|(k, v)| Ok((k.clone(), interp.interpolate(v, scope)?)))
                .collect()
        };

        let mut request = ExecutionRequest::new(self.method, interp.interpolate(&self.target, scope)?)
            .endpoint(interp.interpolate(&self.endpoint, scope)?)
            .response_type(self.response_type);
        request.headers = render_pairs(&self.headers)?;
        request.query = render_pairs(&self.query)?;
        request.path_variables = render_pairs(&self.path_variables)?.into_iter().collect();
        request.body = match &self.body {
            BodyTemplate::Empty => RequestBody::Empty,
            BodyTemplate::Json(tree) => RequestBody::Json(interp.interpolate_json(tree, scope)?),
            BodyTemplate::Form(fields) => RequestBody::Form(render_pairs(fields)?),
            BodyTemplate::Multipart(fields) => RequestBody::Multipart(
                fields
                    .iter()
                    .map(|f| {
                        Ok(MultipartField {
                            name: f.name.clone(),
                            value: interp.interpolate(&f.value, scope)?,
                            file_name: f.file_name.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(request)
    }
}

fn recontext(err: PlanError, context: &str) -> PlanError {
    match err {
        PlanError::InvalidField { field, reason, .. } => PlanError::InvalidField {
            field,
            context: context.to_string(),
            reason,
        },
        other => other,
    }
}

fn pairs(map: &std::collections::BTreeMap<String, String>) -> Vec<(String, String)> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn invalid_body(context: &str, reason: impl Into<String>) -> anyhow::Error {
    PlanError::InvalidField {
        field: "body",
        context: context.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_body(config: &RequestConfig, context: &str) -> Result<BodyTemplate> {
    let kind = match (&config.body_type, &config.body) {
        (Some(kind), _) => kind.to_ascii_lowercase(),
        (None, Some(_)) => "json".to_string(),
        (None, None) => "none".to_string(),
    };
    if !matches!(kind.as_str(), "none" | "json" | "form" | "multipart") {
        return Err(PlanError::InvalidField {
            field: "bodyType",
            context: context.to_string(),
            reason: format!("unsupported body type `{kind}`"),
        }
        .into());
    }

    match (kind.as_str(), &config.body) {
        ("none", _) | (_, None) => Ok(BodyTemplate::Empty),
        ("json", Some(tree)) => Ok(BodyTemplate::Json(tree.clone())),
        ("form", Some(JsonValue::Object(map))) => map
            .iter()
            .map(|(k, v)| {
                scalar_text(v)
                    .map(|text| (k.clone(), text))
                    .ok_or_else(|| invalid_body(context, format!("form field `{k}` must be a scalar")))
            })
            .collect::<Result<Vec<_>>>()
            .map(BodyTemplate::Form),
        ("multipart", Some(JsonValue::Object(map))) => map
            .iter()
            .map(|(k, v)| multipart_field(k, v, context))
            .collect::<Result<Vec<_>>>()
            .map(BodyTemplate::Multipart),
        (_, Some(_)) => Err(invalid_body(context, format!("{kind} body must be a mapping"))),
    }
}

/// A part is either a scalar or `{value, fileName}`.
fn multipart_field(name: &str, value: &JsonValue, context: &str) -> Result<MultipartField> {
    if let Some(text) = scalar_text(value) {
        return Ok(MultipartField {
            name: name.to_string(),
            value: text,
            file_name: None,
        });
    }
    let text = value
        .get("value")
        .and_then(scalar_text)
        .ok_or_else(|| invalid_body(context, format!("multipart part `{name}` needs a `value`")))?;
    Ok(MultipartField {
        name: name.to_string(),
        value: text,
        file_name: value.get("fileName").and_then(scalar_text),
    })
}

/// Renders the template with the work item's scope plus `attempt`.
#[derive(Debug, Clone)]
pub struct TemplateRequestFactory {
    template: Arc<RequestTemplate>,
    scope: VarScope,
}

impl TemplateRequestFactory {
    pub fn new(template: Arc<RequestTemplate>, scope: VarScope) -> Self {
        Self { template, scope }
    }
}

impl RequestFactory for TemplateRequestFactory {
    fn create(&self, seq: u64) -> Result<ExecutionRequest> {
        let attempt = i64::try_from(seq).context("attempt number out of range")?;
        let scope = self.scope.fork().with("attempt", attempt);
        self.template.render(&scope)
    }
}
