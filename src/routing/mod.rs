//! # Routing Tree Compiler
//!
//! Turns the routes of a VirtualServer (and the subroutes of its
//! VirtualServerRoutes) into proxy locations. A route is first lifted into
//! a [`RouteNode`] tree, then [`RoutingCompiler`] walks the tree:
//!
//! - a leaf at the top level becomes a public location
//! - a split becomes a `split_clients` block over `$request_id` with one
//!   internal location per branch
//! - a match becomes a chain of condition maps and a root map whose value
//!   selects the first branch whose conditions all hold
//!
//! Split and match routes get an internal redirect from the public path to
//! the selecting variable.

pub mod compiler;
pub mod error_pages;
pub mod locations;
pub mod matches;
pub mod node;
pub mod variables;

pub use compiler::{CompiledRouting, RouteScope, RoutingCompiler};
pub use error_pages::{generate_error_page_locations, generate_error_pages};
pub use locations::{generate_path, LocationSettings};
pub use node::{ConditionalBranch, RouteNode, WeightedBranch};
pub use variables::VariableNamer;
