//! Value grammars for annotations and ConfigMap keys.
//!
//! Every parser returns a [`ValueError`] instead of panicking; callers
//! skip the offending key and keep the previous value.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::ResourceKey;

/// A single value failed its grammar
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    fn invalid_syntax(value: &str) -> Self {
        Self(format!("parsing {:?}: invalid syntax", value))
    }
}

/// Load balancing methods accepted for OSS
const LB_METHODS: &[&str] = &["least_conn", "ip_hash", "random", "random two", "random two least_conn"];

/// Additional methods accepted for Plus
const PLUS_ONLY_LB_METHODS: &[&str] = &[
    "random two least_time=header",
    "random two least_time=last_byte",
    "least_time header",
    "least_time last_byte",
    "least_time header inflight",
    "least_time last_byte inflight",
];

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+([ms|s|m|h|d|w|M|y]?){0,1} *)+$")
        .expect("TIME_REGEX should be a valid regex pattern")
});

static OFFSET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+[kKmMgG]?$").expect("OFFSET_REGEX should be a valid regex pattern")
});

static SIZE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[kKmM]?$").expect("SIZE_REGEX should be a valid regex pattern"));

pub fn parse_bool(s: &str) -> Result<bool, ValueError> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ValueError::invalid_syntax(s)),
    }
}

pub fn parse_int(s: &str) -> Result<i64, ValueError> {
    s.parse::<i64>().map_err(|_| ValueError::invalid_syntax(s))
}

pub fn parse_uint64(s: &str) -> Result<u64, ValueError> {
    if s.starts_with('+') {
        return Err(ValueError::invalid_syntax(s));
    }
    s.parse::<u64>().map_err(|_| ValueError::invalid_syntax(s))
}

/// A time value such as `10s`, `1m 30s` or `500`
pub fn parse_time(s: &str) -> Result<String, ValueError> {
    let s = s.trim();
    if TIME_REGEX.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(ValueError("Invalid time string".to_string()))
    }
}

pub fn parse_offset(s: &str) -> Result<String, ValueError> {
    let s = s.trim();
    if OFFSET_REGEX.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(ValueError("Invalid offset string".to_string()))
    }
}

pub fn parse_size(s: &str) -> Result<String, ValueError> {
    let s = s.trim();
    if SIZE_REGEX.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(ValueError("Invalid size string".to_string()))
    }
}

/// Comma-separated list of port numbers
pub fn parse_port_list(s: &str) -> Result<Vec<u16>, ValueError> {
    s.split(',').map(parse_port).collect()
}

fn parse_port(value: &str) -> Result<u16, ValueError> {
    let port: i64 = value
        .parse()
        .map_err(|_| ValueError(format!("Unable to parse port as integer: parsing {:?}: invalid syntax", value)))?;
    if port <= 0 {
        return Err(ValueError(format!("Port number should be greater than zero: {}", port)));
    }
    u16::try_from(port).map_err(|_| ValueError(format!("Unable to parse port as integer: {} out of range", port)))
}

/// Comma-separated list of service names
pub fn parse_service_list(s: &str) -> BTreeSet<String> {
    s.split(',').map(str::to_string).collect()
}

/// `serviceName=tea-svc rewrite=/;serviceName=coffee-svc rewrite=/beans`
pub fn parse_rewrite_list(s: &str) -> Result<BTreeMap<String, String>, ValueError> {
    let mut rewrites = BTreeMap::new();
    for part in s.split(';') {
        let (service, rewrite) = parse_rewrite(part)?;
        rewrites.insert(service, rewrite);
    }
    Ok(rewrites)
}

fn parse_rewrite(part: &str) -> Result<(String, String), ValueError> {
    let invalid = || ValueError(format!("Invalid rewrite format: {}", part));
    let (service_part, rewrite_part) = part.trim().split_once(' ').ok_or_else(invalid)?;
    let service = single_assignment(service_part).ok_or_else(invalid)?;
    let rewrite = single_assignment(rewrite_part).ok_or_else(invalid)?;
    Ok((service.to_string(), rewrite.to_string()))
}

/// `serviceName=tea-svc srv_id expires=1h path=/tea;serviceName=...`
pub fn parse_sticky_service_list(s: &str) -> Result<BTreeMap<String, String>, ValueError> {
    let mut services = BTreeMap::new();
    for part in s.split(';') {
        let invalid = || ValueError(format!("Invalid sticky-cookie service format: {}", part));
        let (service_part, cookie) = part.split_once(' ').ok_or_else(invalid)?;
        let service = single_assignment(service_part).ok_or_else(invalid)?;
        services.insert(service.to_string(), cookie.to_string());
    }
    Ok(services)
}

/// Value of a `key=value` pair with exactly one `=`
fn single_assignment(s: &str) -> Option<&str> {
    let mut parts = s.split('=');
    let _key = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(value)
}

/// Map a load balancing method to its directive. `round_robin` maps to the
/// empty string, the proxy's implicit default.
pub fn parse_lb_method(method: &str) -> Result<String, ValueError> {
    parse_lb_method_from(method, false)
}

pub fn parse_lb_method_for_plus(method: &str) -> Result<String, ValueError> {
    parse_lb_method_from(method, true)
}

fn parse_lb_method_from(method: &str, is_plus: bool) -> Result<String, ValueError> {
    let method = method.trim();
    if method == "round_robin" {
        return Ok(String::new());
    }
    if method.starts_with("hash") {
        return validate_hash_lb_method(method);
    }
    if LB_METHODS.contains(&method) || (is_plus && PLUS_ONLY_LB_METHODS.contains(&method)) {
        return Ok(method.to_string());
    }
    Err(ValueError(format!("Invalid load balancing method: {:?}", method)))
}

fn validate_hash_lb_method(method: &str) -> Result<String, ValueError> {
    let words: Vec<&str> = method.split(' ').collect();
    if words[0] == "hash" && (words.len() == 2 || (words.len() == 3 && words[2] == "consistent")) {
        return Ok(method.to_string());
    }
    Err(ValueError(format!("Invalid load balancing method: {:?}", method)))
}

/// Typed view over an override map (annotations or ConfigMap data) of one
/// resource. Each getter returns `None` when the key is absent.
#[derive(Debug, Clone, Copy)]
pub struct OverrideMap<'a> {
    data: &'a BTreeMap<String, String>,
    context: &'a ResourceKey,
}

impl<'a> OverrideMap<'a> {
    pub fn new(data: &'a BTreeMap<String, String>, context: &'a ResourceKey) -> Self {
        Self { data, context }
    }

    pub fn context(&self) -> &'a ResourceKey {
        self.context
    }

    pub fn raw(&self, key: &str) -> Option<&'a str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<Result<bool, ValueError>> {
        self.raw(key).map(|s| {
            parse_bool(s).map_err(|e| self.value_error(key, "contains invalid bool", &e))
        })
    }

    pub fn get_int(&self, key: &str) -> Option<Result<i64, ValueError>> {
        self.raw(key).map(|s| {
            parse_int(s).map_err(|e| self.value_error(key, "contains invalid integer", &e))
        })
    }

    pub fn get_uint64(&self, key: &str, non_zero: bool) -> Option<Result<u64, ValueError>> {
        self.raw(key).map(|s| {
            let value = parse_uint64(s).map_err(|e| self.value_error(key, "contains invalid uint64", &e))?;
            if non_zero && value == 0 {
                return Err(ValueError(format!(
                    "{} {}/{} '{}' must be greater than 0, ignoring",
                    self.context.kind,
                    self.context.namespace,
                    self.context.name,
                    key
                )));
            }
            Ok(value)
        })
    }

    pub fn get_string_list(&self, key: &str, delimiter: &str) -> Option<Vec<String>> {
        self.raw(key).map(|s| s.split(delimiter).map(str::to_string).collect())
    }

    fn value_error(&self, key: &str, what: &str, err: &ValueError) -> ValueError {
        ValueError(format!(
            "{} {}/{} '{}' {}: {}, ignoring",
            self.context.kind, self.context.namespace, self.context.name, key, what, err
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;

    #[test]
    fn test_parse_bool_grammar() {
        for ok in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(ok), Ok(true));
        }
        for ok in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(ok), Ok(false));
        }
        assert!(parse_bool("yes").is_err());
        assert!(parse_bool("tRuE").is_err());
    }

    #[test]
    fn test_parse_time() {
        for ok in ["1h", "10s", "1m 30s", "5", " 2d "] {
            assert!(parse_time(ok).is_ok(), "{}", ok);
        }
        for bad in ["", "10x", "s10", "-1s"] {
            assert!(parse_time(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_parse_offset_and_size() {
        assert_eq!(parse_offset("1g").unwrap(), "1g");
        assert!(parse_size("1g").is_err());
        assert_eq!(parse_size(" 16k ").unwrap(), "16k");
        assert!(parse_size("16kb").is_err());
    }

    #[test]
    fn test_parse_port_list() {
        assert_eq!(parse_port_list("80,8080").unwrap(), vec![80, 8080]);
        assert!(parse_port_list("80,").is_err());
        assert!(parse_port_list("0").is_err());
        assert!(parse_port_list("70000").is_err());
    }

    #[test]
    fn test_parse_rewrite_list() {
        let rewrites = parse_rewrite_list("serviceName=tea-svc rewrite=/;serviceName=coffee-svc rewrite=/beans").unwrap();
        assert_eq!(rewrites["tea-svc"], "/");
        assert_eq!(rewrites["coffee-svc"], "/beans");
        assert!(parse_rewrite_list("serviceName=tea-svc").is_err());
        assert!(parse_rewrite_list("serviceName=tea-svc rewrite=/a=b").is_err());
    }

    #[test]
    fn test_parse_sticky_service_list() {
        let services =
            parse_sticky_service_list("serviceName=tea-svc srv_id expires=1h path=/tea").unwrap();
        assert_eq!(services["tea-svc"], "srv_id expires=1h path=/tea");
        assert!(parse_sticky_service_list("tea-svc").is_err());
    }

    #[test]
    fn test_parse_lb_method() {
        assert_eq!(parse_lb_method("round_robin").unwrap(), "");
        assert_eq!(parse_lb_method(" least_conn ").unwrap(), "least_conn");
        assert_eq!(parse_lb_method("hash $request_id consistent").unwrap(), "hash $request_id consistent");
        assert!(parse_lb_method("hash").is_err());
        assert!(parse_lb_method("hash a b").is_err());
        assert!(parse_lb_method("least_time header").is_err());
        assert_eq!(parse_lb_method_for_plus("least_time header").unwrap(), "least_time header");
        assert_eq!(
            parse_lb_method("fastest").unwrap_err().to_string(),
            "Invalid load balancing method: \"fastest\""
        );
    }

    #[test]
    fn test_override_map_messages() {
        let key = ResourceKey::new(ResourceKind::Ingress, "default", "cafe");
        let mut data = BTreeMap::new();
        data.insert("nginx.org/proxy-buffering".to_string(), "notabool".to_string());
        data.insert("variables-hash-bucket-size".to_string(), "0".to_string());
        let overrides = OverrideMap::new(&data, &key);

        let err = overrides.get_bool("nginx.org/proxy-buffering").unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Ingress default/cafe 'nginx.org/proxy-buffering' contains invalid bool: parsing \"notabool\": invalid syntax, ignoring"
        );
        assert!(overrides.get_bool("missing").is_none());

        let err = overrides.get_uint64("variables-hash-bucket-size", true).unwrap().unwrap_err();
        assert!(err.to_string().ends_with("must be greater than 0, ignoring"));
        assert_eq!(overrides.get_uint64("variables-hash-bucket-size", false).unwrap(), Ok(0));
    }
}
