use barrage_context::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of an execution plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    /// `0` sequential, `>0` bounded, `<0` fully parallel.
    #[serde(default)]
    pub concurrency: i64,
    pub flows: Vec<FlowConfig>,
}

/// One node of the flow tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    pub id: String,
    #[serde(rename = "type", default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub mkdir: bool,
    #[serde(default)]
    pub values: Vec<Binding>,
    #[serde(default)]
    pub thread_only_values: Vec<Binding>,
    #[serde(default)]
    pub concurrency: i64,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    #[default]
    File,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub key: String,
    pub value: Value,
}

/// A leaf document referenced by a `file` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafConfig {
    /// `MassExecute` or `OneExecute`.
    #[serde(rename = "type")]
    pub leaf_type: String,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
    #[serde(default)]
    pub request: Option<RequestConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// 请求定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Names the output file; defaults to `request_<index>`.
    #[serde(default)]
    pub id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub query_param: BTreeMap<String, String>,
    #[serde(default)]
    pub path_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// `none`, `json`, `form` or `multipart`.
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub data: Vec<DataConfig>,
    /// Milliseconds between attempts.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub await_prev_response: bool,
    #[serde(default)]
    pub success_break: Vec<String>,
    #[serde(rename = "break", default)]
    pub break_config: BreakConfig,
    #[serde(default)]
    pub record_exclude_filter: ExcludeConfig,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub name: String,
    pub query: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakConfig {
    /// Wall-clock limit in milliseconds.
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub sys_error: bool,
    #[serde(default)]
    pub parse_error: bool,
    #[serde(default)]
    pub write_error: bool,
    #[serde(default)]
    pub status_code: Vec<IntConditionConfig>,
    #[serde(default)]
    pub response_body: Vec<BodyConditionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludeConfig {
    #[serde(default)]
    pub count: Vec<IntConditionConfig>,
    #[serde(default)]
    pub status_code: Vec<IntConditionConfig>,
    #[serde(default)]
    pub response_body: Vec<BodyConditionConfig>,
}

/// `value` may be written as a number (`200`) or text (`"500,599"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntConditionConfig {
    pub id: String,
    pub op: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyConditionConfig {
    pub id: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sub-directory of the work item's output directory.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// `bearer` or `none`.
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub token: Option<String>,
}
