//! Input-schema projection.
//!
//! Upstream Gradio schemas are arbitrary JSON Schema; the outward surface is
//! restricted to a supported shape: primitives, enums, arrays of primitives,
//! shallow objects, and Gradio `FileData` wrappers (representable as URL
//! strings). Everything else degrades to the closest supported form.

use serde_json::{json, Map, Value};

/// Canonical projection of a Gradio `FileData` wrapper.
fn filedata_schema(description: Option<&str>) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": "Path or URL of the file"},
            "url": {"type": "string"},
            "size": {"type": "integer"},
            "orig_name": {"type": "string"},
            "mime_type": {"type": "string"}
        },
        "required": ["path"]
    });
    if let Some(description) = description {
        schema["description"] = Value::String(description.to_string());
    }
    schema
}

/// Heuristic for Gradio FileData shapes: an object schema whose properties
/// carry the characteristic file fields.
fn is_filedata(schema: &Value) -> bool {
    if schema
        .get("x-gradio")
        .and_then(Value::as_str)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("filedata"))
    {
        return true;
    }
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return false;
    };
    props.contains_key("path") && (props.contains_key("url") || props.contains_key("orig_name"))
}

fn is_primitive_type(t: &str) -> bool {
    matches!(t, "string" | "number" | "integer" | "boolean")
}

/// Project one property schema into the supported shape. `depth` guards the
/// one level of object nesting the surface allows.
fn project_property(schema: &Value, optional: bool, depth: usize) -> Value {
    if is_filedata(schema) {
        return filedata_schema(schema.get("description").and_then(Value::as_str));
    }

    let mut out = Map::new();
    if let Some(description) = schema.get("description").and_then(Value::as_str) {
        out.insert("description".to_string(), json!(description));
    }

    // enums pass through regardless of declared type
    if let Some(variants) = schema.get("enum") {
        out.insert("enum".to_string(), variants.clone());
        if let Some(t) = schema.get("type").and_then(Value::as_str) {
            if is_primitive_type(t) {
                out.insert("type".to_string(), json!(t));
            }
        }
        if optional {
            if let Some(default) = schema.get("default") {
                out.insert("default".to_string(), default.clone());
            }
        }
        return Value::Object(out);
    }

    match schema.get("type").and_then(Value::as_str) {
        Some(t) if is_primitive_type(t) => {
            out.insert("type".to_string(), json!(t));
        }
        Some("array") => {
            out.insert("type".to_string(), json!("array"));
            let items = schema
                .get("items")
                .map(|items| project_property(items, true, depth + 1))
                .unwrap_or_else(|| json!({"type": "string"}));
            out.insert("items".to_string(), items);
        }
        Some("object") | None => {
            out.insert("type".to_string(), json!("object"));
            if depth == 0 {
                if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                    let required: Vec<&str> = schema
                        .get("required")
                        .and_then(Value::as_array)
                        .map(|a| a.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default();
                    let mut projected = Map::new();
                    for (key, prop) in props {
                        let prop_optional = !required.contains(&key.as_str());
                        projected
                            .insert(key.clone(), project_property(prop, prop_optional, depth + 1));
                    }
                    out.insert("properties".to_string(), Value::Object(projected));
                    if !required.is_empty() {
                        out.insert("required".to_string(), json!(required));
                    }
                }
            }
            // deeper objects lose their structure
        }
        Some(_) => {
            // unsupported primitive (e.g. null) degrades to string
            out.insert("type".to_string(), json!("string"));
        }
    }

    // defaults only apply to optional fields
    if optional {
        if let Some(default) = schema.get("default") {
            out.insert("default".to_string(), default.clone());
        }
    }

    Value::Object(out)
}

/// Project an upstream tool input schema into the supported outward shape.
pub fn project_input_schema(schema: &Value) -> Value {
    let properties = schema.get("properties").and_then(Value::as_object);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut projected = Map::new();
    if let Some(properties) = properties {
        for (key, prop) in properties {
            let optional = !required.contains(&key.as_str());
            projected.insert(key.clone(), project_property(prop, optional, 0));
        }
    }

    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));
    out.insert("properties".to_string(), Value::Object(projected));
    if !required.is_empty() {
        out.insert("required".to_string(), json!(required));
    }
    Value::Object(out)
}
