use serde_json::Value;

/// A stored entry is valid when it is an object with string `id`, `name`
/// and `content` and an integer `timestamp`.
pub fn is_valid_entry(item: &Value) -> bool {
    let Some(obj) = item.as_object() else {
        return false;
    };
    let is_str = |field: &str| obj.get(field).is_some_and(Value::is_string);
    is_str("id")
        && is_str("name")
        && is_str("content")
        && obj.get("timestamp").and_then(Value::as_i64).is_some()
}
