//! Formatted output helpers for CLI commands.
//!
//! Tokens are shown in a compact, readable form instead of raw JSON.

use serde_json::Value;

/// Renders a property value, abbreviating reference tokens.
///
/// `{"Ref": "Vpc"}` becomes `ref(Vpc)`, `{"Fn::GetAtt": ["Lb", "DNSName"]}`
/// becomes `Lb.DNSName`, and `{"Fn::Sub": "..."}` becomes its template.
#[must_use]
pub fn format_value(value: &Value) -> String {
    if let Some(obj) = value.as_object().filter(|o| o.len() == 1) {
        if let Some(Value::String(id)) = obj.get("Ref") {
            return format!("ref({id})");
        }
        if let Some(Value::Array(parts)) = obj.get("Fn::GetAtt") {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            return parts.join(".");
        }
        if let Some(Value::String(template)) = obj.get("Fn::Sub") {
            return template.clone();
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A horizontal rule of `width` box-drawing characters.
#[must_use]
pub fn rule(width: usize) -> String {
    "\u{2550}".repeat(width)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn format_value_abbreviates_ref() {
        assert_eq!(format_value(&json!({ "Ref": "Vpc" })), "ref(Vpc)");
    }

    #[test]
    fn format_value_abbreviates_getatt() {
        assert_eq!(
            format_value(&json!({ "Fn::GetAtt": ["LoadBalancer", "DNSName"] })),
            "LoadBalancer.DNSName"
        );
    }

    #[test]
    fn format_value_unwraps_sub_and_strings() {
        assert_eq!(format_value(&json!({ "Fn::Sub": "${AWS::AccountId}.x" })), "${AWS::AccountId}.x");
        assert_eq!(format_value(&json!("plain")), "plain");
        assert_eq!(format_value(&json!(8000)), "8000");
    }

    #[test]
    fn rule_has_requested_width() {
        assert_eq!(rule(3).chars().count(), 3);
    }
}
