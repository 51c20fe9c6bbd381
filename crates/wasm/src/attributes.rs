use serde_json::{Map, Value};

const DATA_PREFIX: &str = "data-";
const FLAG_FIELDS: &[&str] = &["admin"];
const NUMBER_FIELDS: &[&str] = &["auto_open_ratio"];

/// Turns the script tag's `data-*` attributes into settings overrides.
///
/// `data-chat-endpoint="/api/ask"` becomes `chat_endpoint: "/api/ask"`. A bare
/// `data-admin` counts as `true`.
pub fn settings_overrides<'a>(
    attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Map<String, Value> {
    let mut overrides = Map::new();
    for (name, raw) in attributes {
        let Some(key) = name.trim().to_ascii_lowercase().strip_prefix(DATA_PREFIX).map(field_name)
        else {
            continue;
        };
        if key.is_empty() {
            continue;
        }

        let value = if FLAG_FIELDS.contains(&key.as_str()) {
            Value::Bool(parse_flag(raw))
        } else if NUMBER_FIELDS.contains(&key.as_str()) {
            raw.trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string()))
        } else {
            Value::String(raw.to_string())
        };
        overrides.insert(key, value);
    }
    overrides
}

fn field_name(attribute: &str) -> String {
    attribute.replace('-', "_")
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}
