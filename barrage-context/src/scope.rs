use crate::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable-on-fork key/value container handed to each work item.
///
/// Forking is a cheap `Arc` clone; the first write on a fork copies the
/// underlying map, so concurrent siblings never observe each other's
/// bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarScope {
    vars: Arc<HashMap<String, Value>>,
}

impl VarScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of this scope that can be extended independently.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Returns a scope with `key` bound to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.vars).insert(key.into(), value.into());
        self
    }

    pub fn extend<I>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let vars = Arc::make_mut(&mut self.vars);
        for (key, value) in bindings {
            vars.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Resolves `name` or `name.key.subkey` against nested map values.
    pub fn resolve(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let head = parts.next()?;
        self.vars.get(head)?.lookup(parts)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_fork_isolates_writes() {
        let parent = VarScope::new().with("host", "example.com");
        let child_a = parent.fork().with("user", "a");
        let child_b = parent.fork().with("user", "b");

        assert_eq!(parent.get("user"), None);
        assert_eq!(child_a.get("user"), Some(&Value::from("a")));
        assert_eq!(child_b.get("user"), Some(&Value::from("b")));
        assert_eq!(child_b.get("host"), Some(&Value::from("example.com")));
    }

    #[test]
    fn test_resolve_dotted() {
        let mut inner = BTreeMap::new();
        inner.insert("token".to_string(), Value::from("abc"));
        let scope = VarScope::new().with("auth", Value::Map(inner));

        assert_eq!(scope.resolve("auth.token"), Some(&Value::from("abc")));
        assert_eq!(scope.resolve("auth.missing"), None);
        assert_eq!(scope.resolve("missing"), None);
    }
}
