use serde_json::{Map, Value};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// "1 review", "3 reviews"
pub fn format_count(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Opening hours as `(day, hours)` rows in the order the server lists them.
pub fn format_hours(hours: &Map<String, Value>) -> Vec<(String, String)> {
    hours
        .iter()
        .map(|(day, h)| {
            let text = match h {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (day.clone(), text)
        })
        .collect()
}
