use crate::config::{LeafConfig, PlanConfig};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// 计划加载器，按文件扩展名选择 YAML 或 JSON
pub struct PlanLoader;

impl PlanLoader {
    /// Loads an execution plan; `.json` is read as JSON, anything else as
    /// YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PlanConfig> {
        load(path.as_ref())
    }

    pub fn from_yaml_str(content: &str) -> Result<PlanConfig> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML plan")
    }

    pub fn from_json_str(content: &str) -> Result<PlanConfig> {
        serde_json::from_str(content).with_context(|| "Failed to parse JSON plan")
    }

    /// Loads a leaf document referenced by a `file` node.
    pub fn leaf_from_file<P: AsRef<Path>>(path: P) -> Result<LeafConfig> {
        load(path.as_ref())
    }

    pub fn leaf_from_yaml_str(content: &str) -> Result<LeafConfig> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML leaf document")
    }

    pub fn leaf_from_json_str(content: &str) -> Result<LeafConfig> {
        serde_json::from_str(content).with_context(|| "Failed to parse JSON leaf document")
    }

    /// 保存计划到 YAML 文件
    pub fn save_to_yaml<P: AsRef<Path>>(config: &PlanConfig, path: P) -> Result<()> {
        let yaml_content =
            serde_yaml::to_string(config).with_context(|| "Failed to serialize plan to YAML")?;
        fs::write(&path, yaml_content)
            .with_context(|| format!("Failed to write YAML file: {:?}", path.as_ref()))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path:?}"))?;
    if is_json(path) {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON content of {path:?}"))
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML content of {path:?}"))
    }
}
