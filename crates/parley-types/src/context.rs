//! Runtime context variables.

/// Session context: variable name to JSON value.
pub type ContextVars = serde_json::Map<String, serde_json::Value>;

/// Merge `update` into `base`, last write wins.
pub fn merge_context(base: &mut ContextVars, update: &ContextVars) {
    for (key, value) in update {
        base.insert(key.clone(), value.clone());
    }
}

/// Keep only the entries whose keys appear in `keys`.
pub fn restrict_context(vars: &ContextVars, keys: &[String]) -> ContextVars {
    vars.iter()
        .filter(|(key, _)| keys.iter().any(|k| k == *key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
