//! JSON Schema generation for response shapes and tool arguments.

use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde_json::{Map, Value};

/// Generates a self-contained JSON schema for `T`.
///
/// Subschemas are inlined, the `$schema` marker is dropped, and every object
/// forbids additional properties so the schema is accepted by strict structured
/// output modes.
pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut value = schema.to_value();
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
    }
    forbid_additional_properties(&mut value);
    value
}

fn forbid_additional_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) {
                map.entry("additionalProperties")
                    .or_insert(Value::Bool(false));
            }
            for child in map.values_mut() {
                forbid_additional_properties(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(forbid_additional_properties),
        _ => {}
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Location {
        city: String,
        country: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Trip {
        from: Location,
        to: Location,
    }

    #[test]
    fn schema_is_inlined_and_strict() {
        let schema = generate_schema::<Trip>();
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("$defs").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["from"]["type"], "object");
        assert_eq!(
            schema["properties"]["from"]["additionalProperties"],
            false
        );
    }
}
