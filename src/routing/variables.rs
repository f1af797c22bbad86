//! Names of the variables and internal locations a compile emits.

use crate::domain::VirtualServer;

pub const INTERNAL_LOCATION_PREFIX: &str = "internal_location_";

/// Variable names scoped to one VirtualServer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableNamer {
    safe_ns_name: String,
}

impl VariableNamer {
    pub fn new(vs: &VirtualServer) -> Self {
        let safe_ns_name = format!("{}_{}", vs.metadata.namespace, vs.metadata.name).replace('-', "_");
        Self { safe_ns_name }
    }

    pub fn split_client_variable(&self, index: usize) -> String {
        format!("$vs_{}_splits_{}", self.safe_ns_name, index)
    }

    /// Variable of condition `condition` of branch `branch` in match block `matches`
    pub fn match_condition_variable(&self, matches: usize, branch: usize, condition: usize) -> String {
        format!("$vs_{}_matches_{}_match_{}_cond_{}", self.safe_ns_name, matches, branch, condition)
    }

    pub fn match_main_variable(&self, matches: usize) -> String {
        format!("$vs_{}_matches_{}", self.safe_ns_name, matches)
    }
}

pub fn split_location_path(split_index: usize, branch: usize) -> String {
    format!("/{}splits_{}_split_{}", INTERNAL_LOCATION_PREFIX, split_index, branch)
}

pub fn match_location_path(matches: usize, branch: usize) -> String {
    format!("/{}matches_{}_match_{}", INTERNAL_LOCATION_PREFIX, matches, branch)
}

pub fn match_default_location_path(matches: usize) -> String {
    format!("/{}matches_{}_default", INTERNAL_LOCATION_PREFIX, matches)
}
