//! JSON request bodies, flattened into `json.a.b` style arguments.

use crate::variables::Collection;
use serde_json::Value;

/// Parse `body` and flatten every scalar leaf.
pub(super) fn flatten(body: &[u8]) -> Result<Collection, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("JSON parsing error: {}", e))?;
    let mut args = Collection::new();
    walk("json", &value, &mut args);
    Ok(args)
}

fn walk(path: &str, value: &Value, out: &mut Collection) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(&format!("{}.{}", path, key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(&format!("{}.{}", path, i), child, out);
            }
        }
        Value::String(s) => out.add(path, s.as_str()),
        Value::Number(n) => out.add(path, n.to_string()),
        Value::Bool(b) => out.add(path, b.to_string()),
        Value::Null => out.add(path, ""),
    }
}
