//! Argument extraction for tool calls.
//!
//! Malformed arguments are not failures of the run: the `Err` side carries the
//! message handed back to the model as tool output.

use serde_json::Value;

pub type ArgResult<T> = Result<T, String>;

pub fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Integer value. Integral floats and numeric strings are accepted since
/// models emit both.
pub fn get_i64(args: &Value, key: &str) -> Option<i64> {
    as_i64(args.get(key)?)
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_absent(args: &Value, key: &str) -> bool {
    args.get(key).map_or(true, Value::is_null)
}

fn missing(key: &str) -> String {
    format!("Error: Missing required argument: {key}")
}

pub fn require_str<'a>(args: &'a Value, key: &str) -> ArgResult<&'a str> {
    if is_absent(args, key) {
        return Err(missing(key));
    }
    get_str(args, key).ok_or_else(|| format!("Error: {key} must be a string"))
}

pub fn require_i64(args: &Value, key: &str) -> ArgResult<i64> {
    if is_absent(args, key) {
        return Err(missing(key));
    }
    get_i64(args, key).ok_or_else(|| format!("Error: {key} must be an integer"))
}

/// Positive count such as `top_k`: absent means `default`, anything that is
/// not a positive integer is rejected.
pub fn positive_or_default(args: &Value, key: &str, default: usize) -> ArgResult<usize> {
    if is_absent(args, key) {
        return Ok(default);
    }
    match get_i64(args, key) {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(format!("Error: {key} must be a positive integer")),
    }
}

pub fn require_i64_list(args: &Value, key: &str) -> ArgResult<Vec<i64>> {
    if is_absent(args, key) {
        return Err(missing(key));
    }
    let bad = || format!("Error: {key} must be a list of integers");
    args.get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(bad)?
        .iter()
        .map(|v| as_i64(v).ok_or_else(bad))
        .collect()
}
