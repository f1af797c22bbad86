//! # Parameter Resolver
//!
//! Layers compiled defaults, the controller ConfigMap and per-resource
//! annotations into one [`ConfigParams`]. Every key is parsed on its own:
//! a malformed value is skipped and reported as a [`RejectedOverride`]
//! while the remaining keys still apply.

pub mod annotations;
pub mod config_params;
pub mod configmap;
pub mod global;
pub mod parsing;

use serde::{Deserialize, Serialize};

use crate::domain::ResourceKey;
use crate::warnings::Warnings;

pub use annotations::{
    filter_master_annotations, filter_minion_annotations, merge_master_annotations_into_minion,
    parse_annotations, MASTER_DENYLIST, MINION_DENYLIST, MINION_INHERITANCE_LIST,
};
pub use config_params::{ConfigParams, GlobalConfigParams, ListenerParams, StaticConfigParams};
pub use configmap::{generate_main_config, parse_config_map};
pub use global::parse_global_configuration;
pub use parsing::{OverrideMap, ValueError};

/// An override that was skipped or ignored during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOverride {
    pub key: String,
    pub message: String,
}

impl RejectedOverride {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self { key: key.into(), message: message.into() }
    }
}

/// Attach rejected overrides to the resource they came from
pub fn rejected_to_warnings(resource: &ResourceKey, rejected: &[RejectedOverride]) -> Warnings {
    let mut warnings = Warnings::new();
    for r in rejected {
        warnings.add(resource, r.message.clone());
    }
    warnings
}

/// One resolution layer: an override map plus the overrides it rejected.
/// Each `set_*` call parses one key and writes the target only on success.
#[derive(Debug)]
pub(crate) struct Layer<'a> {
    pub(crate) overrides: OverrideMap<'a>,
    rejected: Vec<RejectedOverride>,
}

/// Keys of the HSTS group, resolved atomically
pub(crate) struct HstsKeys {
    pub(crate) enabled: &'static str,
    pub(crate) max_age: &'static str,
    pub(crate) include_subdomains: &'static str,
    pub(crate) behind_proxy: &'static str,
}

impl<'a> Layer<'a> {
    pub(crate) fn new(overrides: OverrideMap<'a>) -> Self {
        Self { overrides, rejected: Vec::new() }
    }

    /// A value failed its grammar
    pub(crate) fn invalid(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(key = %key, "{}", message);
        self.rejected.push(RejectedOverride::new(key, message));
    }

    /// A valid key that the current proxy variant cannot use
    pub(crate) fn ignored(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(key = %key, "{}", message);
        self.rejected.push(RejectedOverride::new(key, message));
    }

    pub(crate) fn set_bool(&mut self, key: &str, target: &mut bool) {
        match self.overrides.get_bool(key) {
            Some(Ok(value)) => *target = value,
            Some(Err(e)) => self.invalid(key, e.to_string()),
            None => {}
        }
    }

    pub(crate) fn set_int(&mut self, key: &str, target: &mut i64) {
        match self.overrides.get_int(key) {
            Some(Ok(value)) => *target = value,
            Some(Err(e)) => self.invalid(key, e.to_string()),
            None => {}
        }
    }

    pub(crate) fn set_uint64(&mut self, key: &str, non_zero: bool, target: &mut u64) {
        match self.overrides.get_uint64(key, non_zero) {
            Some(Ok(value)) => *target = value,
            Some(Err(e)) => self.invalid(key, e.to_string()),
            None => {}
        }
    }

    pub(crate) fn set_string(&self, key: &str, target: &mut String) {
        if let Some(value) = self.overrides.raw(key) {
            *target = value.to_string();
        }
    }

    pub(crate) fn set_list(&self, key: &str, delimiter: &str, target: &mut Vec<String>) {
        if let Some(values) = self.overrides.get_string_list(key, delimiter) {
            *target = values;
        }
    }

    /// `on`/`off` from a bool. On Plus any other string is passed through
    /// verbatim as a custom server token.
    pub(crate) fn set_server_tokens(&mut self, key: &str, is_plus: bool, target: &mut String) {
        match self.overrides.get_bool(key) {
            Some(Ok(enabled)) => *target = if enabled { "on" } else { "off" }.to_string(),
            Some(Err(e)) => {
                if is_plus {
                    self.set_string(key, target);
                } else {
                    self.invalid(key, e.to_string());
                }
            }
            None => {}
        }
    }

    /// Resolve the HSTS flag and its sub-fields as one group. Any invalid
    /// member leaves the whole group untouched with a single diagnostic.
    pub(crate) fn set_hsts_group(&mut self, keys: &HstsKeys, params: &mut ConfigParams) {
        let hsts = match self.overrides.get_bool(keys.enabled) {
            None => return,
            Some(Err(e)) => {
                self.invalid(keys.enabled, e.to_string());
                return;
            }
            Some(Ok(hsts)) => hsts,
        };

        let max_age = self.overrides.get_int(keys.max_age);
        let include_subdomains = self.overrides.get_bool(keys.include_subdomains);
        let behind_proxy = self.overrides.get_bool(keys.behind_proxy);

        let mut errors = Vec::new();
        if let Some(Err(e)) = &max_age {
            errors.push(e.to_string());
        }
        if let Some(Err(e)) = &include_subdomains {
            errors.push(e.to_string());
        }
        if let Some(Err(e)) = &behind_proxy {
            errors.push(e.to_string());
        }

        if !errors.is_empty() {
            for e in &errors {
                tracing::error!("{}", e);
            }
            let context = self.overrides.context();
            self.invalid(
                keys.enabled,
                format!(
                    "{} {}/{}: There are configuration issues with hsts settings, skipping all hsts settings: {}",
                    context.kind,
                    context.namespace,
                    context.name,
                    errors.join("; ")
                ),
            );
            return;
        }

        params.hsts = hsts;
        if let Some(Ok(v)) = max_age {
            params.hsts_max_age = v;
        }
        if let Some(Ok(v)) = include_subdomains {
            params.hsts_include_subdomains = v;
        }
        if let Some(Ok(v)) = behind_proxy {
            params.hsts_behind_proxy = v;
        }
    }

    /// Load balancing method, validated against the variant's method set
    pub(crate) fn set_lb_method(&mut self, key: &str, is_plus: bool, target: &mut String) {
        let Some(method) = self.overrides.raw(key) else {
            return;
        };
        let parsed = if is_plus {
            parsing::parse_lb_method_for_plus(method)
        } else {
            parsing::parse_lb_method(method)
        };
        match parsed {
            Ok(parsed) => *target = parsed,
            Err(e) => {
                let context = self.overrides.context();
                self.invalid(
                    key,
                    format!(
                        "{} {}/{}: Invalid value for the {}: got {:?}: {}",
                        context.kind, context.namespace, context.name, key, method, e
                    ),
                );
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<RejectedOverride> {
        self.rejected
    }
}
