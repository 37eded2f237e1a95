use std::time::Duration;

/// Parse "true"/"false"/"1"/"0" from an owned String.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    parse_bool_str(&s)
}

/// Parse "true"/"false"/"1"/"0" from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a non-empty, trimmed environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_usize(name: &str) -> Option<usize> {
    env_value(name).and_then(|v| v.parse::<usize>().ok())
}

pub fn env_f64(name: &str) -> Option<f64> {
    env_value(name).and_then(|v| v.parse::<f64>().ok())
}

pub fn env_millis(name: &str) -> Option<Duration> {
    env_value(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

pub fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(parse_bool_flag)
}

/// Largest char boundary `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
