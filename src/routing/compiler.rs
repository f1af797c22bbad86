//! Recursive compiler from route trees to locations, maps and split clients.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::domain::{ErrorPage as ErrorPageSpec, Upstream};
use crate::model::http::{
    Distribution, ErrorPageLocation, InternalRedirectLocation, Location, Map, Parameter, ReturnLocation, SplitClient,
};
use crate::upstream::{proxy_ssl_name, UpstreamNamer};

use super::error_pages::generate_error_page_locations;
use super::locations::{location_for_proxying, location_for_redirect, location_for_return, LocationSettings};
use super::matches::{branch_selector, condition_chain};
use super::node::{ConditionalBranch, RouteNode, WeightedBranch};
use super::variables::{match_default_location_path, match_location_path, split_location_path, VariableNamer};

/// Everything emitted for the routes of one VirtualServer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledRouting {
    pub locations: Vec<Location>,
    pub maps: Vec<Map>,
    pub split_clients: Vec<SplitClient>,
    pub internal_redirect_locations: Vec<InternalRedirectLocation>,
    pub return_locations: Vec<ReturnLocation>,
    pub error_page_locations: Vec<ErrorPageLocation>,
}

/// Per-route inputs to the compiler
#[derive(Debug, Clone, Copy)]
pub struct RouteScope<'a> {
    pub namer: &'a UpstreamNamer,
    /// Upstreams of the owning resource by their short name
    pub upstreams: &'a BTreeMap<String, Upstream>,
    pub location: LocationSettings<'a>,
}

/// Compiles every route of one VirtualServer and its routes. Split-client,
/// match and return indices run across all routes so generated names never
/// collide within the server.
#[derive(Debug)]
pub struct RoutingCompiler {
    variables: VariableNamer,
    matches_count: usize,
    out: CompiledRouting,
}

impl RoutingCompiler {
    pub fn new(variables: VariableNamer) -> Self {
        Self { variables, matches_count: 0, out: CompiledRouting::default() }
    }

    /// Register a route's error pages and return the index their names use
    pub fn add_error_pages(&mut self, pages: &[ErrorPageSpec]) -> usize {
        let index = self.out.error_page_locations.len();
        self.out.error_page_locations.extend(generate_error_page_locations(index, pages));
        index
    }

    /// Compile the tree of the route at `path`. Returns the range of
    /// locations it produced so the caller can attach policies.
    pub fn compile_route(&mut self, path: &str, node: &RouteNode, scope: &RouteScope<'_>) -> Range<usize> {
        let start = self.out.locations.len();

        match node {
            RouteNode::Split(_) | RouteNode::Match { .. } => {
                let destination = self.compile_branch(node, String::new(), scope);
                self.out
                    .internal_redirect_locations
                    .push(InternalRedirectLocation { path: path.to_string(), destination });
            }
            leaf => self.emit_leaf(path, leaf, false, scope),
        }

        start..self.out.locations.len()
    }

    pub fn locations_mut(&mut self) -> &mut [Location] {
        &mut self.out.locations
    }

    pub fn finish(self) -> CompiledRouting {
        self.out
    }

    /// Destination of a branch: the internal location path for a leaf, the
    /// selecting variable for a nested split or match
    fn compile_branch(&mut self, node: &RouteNode, leaf_path: String, scope: &RouteScope<'_>) -> String {
        match node {
            RouteNode::Split(branches) => self.compile_split(branches, scope),
            RouteNode::Match { branches, default } => self.compile_match(branches, default, scope),
            leaf => {
                self.emit_leaf(&leaf_path, leaf, true, scope);
                leaf_path
            }
        }
    }

    fn compile_split(&mut self, branches: &[WeightedBranch], scope: &RouteScope<'_>) -> String {
        // reserve the slot first so nested splits number after this one
        let index = self.out.split_clients.len();
        let variable = self.variables.split_client_variable(index);
        self.out.split_clients.push(SplitClient {
            source: "$request_id".to_string(),
            variable: variable.clone(),
            distributions: Vec::new(),
        });

        let mut distributions = Vec::with_capacity(branches.len());
        for (i, branch) in branches.iter().enumerate() {
            let destination = self.compile_branch(&branch.node, split_location_path(index, i), scope);
            distributions.push(Distribution::new(format!("{}%", branch.weight), destination));
        }
        self.out.split_clients[index].distributions = distributions;

        variable
    }

    /// Every branch carries at least one condition; `RouteNode::from_route`
    /// drops the others.
    fn compile_match(&mut self, branches: &[ConditionalBranch], default: &RouteNode, scope: &RouteScope<'_>) -> String {
        let index = self.matches_count;
        self.matches_count += 1;

        for (i, branch) in branches.iter().enumerate() {
            let chain = condition_chain(&branch.conditions, |j| self.variables.match_condition_variable(index, i, j));
            self.out.maps.extend(chain);
        }

        let source = (0..branches.len())
            .map(|i| self.variables.match_condition_variable(index, i, 0))
            .collect::<String>();
        let variable = self.variables.match_main_variable(index);
        let main_map_index = self.out.maps.len();
        self.out.maps.push(Map { source, variable: variable.clone(), parameters: Vec::new() });

        let mut parameters = Vec::with_capacity(branches.len() + 1);
        for (i, branch) in branches.iter().enumerate() {
            let destination = self.compile_branch(&branch.node, match_location_path(index, i), scope);
            parameters.push(Parameter::new(branch_selector(i), destination));
        }
        let destination = self.compile_branch(default, match_default_location_path(index), scope);
        parameters.push(Parameter::new("default", destination));
        self.out.maps[main_map_index].parameters = parameters;

        variable
    }

    fn emit_leaf(&mut self, path: &str, node: &RouteNode, internal: bool, scope: &RouteScope<'_>) {
        let settings = &scope.location;
        match node {
            RouteNode::Redirect { url, code } => {
                self.out.locations.push(location_for_redirect(path, settings.snippets, url, *code));
            }
            RouteNode::Return { code, content_type, body } => {
                let index = self.out.return_locations.len();
                let (location, return_location) =
                    location_for_return(path, settings.snippets, *code, content_type, body, index);
                self.out.locations.push(location);
                self.out.return_locations.push(return_location);
            }
            RouteNode::Proxy { action } => {
                let upstream_name = scope.namer.name_for_action(action);
                let upstream = scope.upstreams.get(action.upstream_name()).cloned().unwrap_or_default();
                let ssl_name = proxy_ssl_name(&upstream.service, scope.namer.namespace());
                self.out.locations.push(location_for_proxying(
                    path,
                    &upstream_name,
                    &upstream,
                    settings,
                    internal,
                    &ssl_name,
                    action.proxy.as_ref(),
                ));
            }
            RouteNode::Split(_) | RouteNode::Match { .. } => {}
        }
    }
}
