//! Condition maps for match routing.
//!
//! The map directive is keyed on a single source, so a conjunction of
//! conditions is encoded as a chain of two-way maps: the success result of
//! condition `i` is the variable of condition `i + 1`, and the last
//! condition yields `1`.

use crate::domain::Condition;
use crate::model::http::{Map, Parameter};

/// Map parameters that are grammar keywords and must be escaped
const SPECIAL_MAP_PARAMETERS: &[&str] = &["default", "hostnames", "include", "volatile"];

/// Source expression of a condition: header, cookie, argument or raw variable
pub fn condition_source(condition: &Condition) -> String {
    if !condition.header.is_empty() {
        return format!("$http_{}", condition.header.replace('-', "_"));
    }
    if !condition.cookie.is_empty() {
        return format!("$cookie_{}", condition.cookie);
    }
    if !condition.argument.is_empty() {
        return format!("$arg_{}", condition.argument);
    }
    condition.variable.clone()
}

/// Map value for a condition literal, and whether it is negated with `!`
pub fn map_value(matched: &str) -> (String, bool) {
    if matched.is_empty() {
        return (r#""""#.to_string(), false);
    }

    let (negated, literal) = match matched.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, matched),
    };

    if SPECIAL_MAP_PARAMETERS.contains(&literal) {
        return (format!(r"\{}", literal), negated);
    }

    (format!(r#""{}""#, literal), negated)
}

/// Two-way parameters: the value maps to `success`, anything else to `0`.
/// A negated value swaps the two results.
pub fn condition_parameters(matched: &str, success: &str) -> Vec<Parameter> {
    let (value, negated) = map_value(matched);
    let (value_result, default_result) = if negated { ("0", success) } else { (success, "0") };

    vec![Parameter::new(value, value_result), Parameter::new("default", default_result)]
}

/// Condition chain of one branch. `variable(j)` names condition `j`.
pub fn condition_chain(conditions: &[Condition], variable: impl Fn(usize) -> String) -> Vec<Map> {
    conditions
        .iter()
        .enumerate()
        .map(|(j, condition)| {
            let success = if j + 1 < conditions.len() { variable(j + 1) } else { "1".to_string() };
            Map {
                source: condition_source(condition),
                variable: variable(j),
                parameters: condition_parameters(&condition.value, &success),
            }
        })
        .collect()
}

/// Value in the root map that selects branch `index`: the concatenated
/// first-condition variables must start with `index` zeros and a one.
pub fn branch_selector(index: usize) -> String {
    format!("~^{}1", "0".repeat(index))
}
