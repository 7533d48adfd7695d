use anyhow::{anyhow, Context, Result};
use barrage_context::VarScope;
use regex::Regex;
use serde_json::Value as JsonValue;

const REFERENCE: &str = r"\$\{\s*([A-Za-z_][\w\-]*(?:\.[\w\-]+)*)\s*\}";

/// 变量插值器：`${name}` 与 `${name.key}`
#[derive(Debug, Clone)]
pub struct Interpolator {
    inline: Regex,
    single: Regex,
}

impl Interpolator {
    pub fn new() -> Result<Self> {
        let inline = Regex::new(REFERENCE).context("compile inline reference regex")?;
        let single = Regex::new(&format!("^{REFERENCE}$"))
            .context("compile single reference regex")?;
        Ok(Self { inline, single })
    }

    /// Replaces every reference in `text`. Unbound names are errors.
    pub fn interpolate(&self, text: &str, scope: &VarScope) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in self.inline.captures_iter(text) {
            let (Some(full), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = resolve(scope, name.as_str())?;
            out.push_str(&text[last..full.start()]);
            out.push_str(&value.to_interpolated_string());
            last = full.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// 对 JSON 树逐节点插值；整串只有一个引用时保留原类型
    pub fn interpolate_json(&self, value: &JsonValue, scope: &VarScope) -> Result<JsonValue> {
        match value {
            JsonValue::String(s) => {
                if let Some(name) = self.single.captures(s.trim()).and_then(|c| c.get(1)) {
                    return Ok(resolve(scope, name.as_str())?.to_json());
                }
                Ok(JsonValue::String(self.interpolate(s, scope)?))
            }
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.interpolate_json(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            JsonValue::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(self.interpolate(key, scope)?, self.interpolate_json(item, scope)?);
                }
                Ok(JsonValue::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn resolve<'a>(scope: &'a VarScope, name: &str) -> Result<&'a barrage_context::Value> {
    scope
        .resolve(name)
        .ok_or_else(|| anyhow!("unresolved variable `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrage_context::Value;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn scope() -> VarScope {
        let mut user = BTreeMap::new();
        user.insert("name".to_string(), Value::from("ada"));
        VarScope::new()
            .with("host", "api.local")
            .with("attempt", 3i64)
            .with("user", Value::Map(user))
    }

    #[test]
    fn test_interpolate_inline() {
        let interp = Interpolator::new().unwrap();
        let out = interp
            .interpolate("http://${host}/users/${ user.name }?n=${attempt}", &scope())
            .unwrap();
        assert_eq!(out, "http://api.local/users/ada?n=3");
    }

    #[test]
    fn test_unbound_reference_is_error() {
        let interp = Interpolator::new().unwrap();
        let err = interp.interpolate("${missing}", &scope()).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert_eq!(interp.interpolate("no refs", &scope()).unwrap(), "no refs");
    }

    #[test]
    fn test_json_keeps_types_for_single_reference() {
        let interp = Interpolator::new().unwrap();
        let body = json!({"seq": "${attempt}", "label": "try ${attempt}", "tags": ["${host}", 1]});
        let out = interp.interpolate_json(&body, &scope()).unwrap();
        assert_eq!(out, json!({"seq": 3, "label": "try 3", "tags": ["api.local", 1]}));
    }
}
