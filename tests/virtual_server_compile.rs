//! End-to-end compilation of a VirtualServer with a split route and a
//! delegated match route.

mod common;

use ingress_configurator::configurator::{JsonRenderer, Renderer};
use ingress_configurator::domain::{Action, Split, VirtualServerEx};
use ingress_configurator::generator::{generate_virtual_server_config, CompileContext};
use ingress_configurator::model::http::{Distribution, InternalRedirectLocation};
use ingress_configurator::model::VirtualServerConfig;
use ingress_configurator::params::{ConfigParams, StaticConfigParams};
use ingress_configurator::warnings::Warnings;
use proptest::prelude::*;

fn compile(vs_ex: &VirtualServerEx) -> (VirtualServerConfig, Warnings) {
    let params = ConfigParams::default();
    let static_params = StaticConfigParams::default();
    let ctx = CompileContext::new(&params, &static_params, false);
    generate_virtual_server_config(vs_ex, &ctx)
}

#[test]
fn test_tea_split_and_coffee_match() {
    let (config, warnings) = compile(&common::cafe_virtual_server());

    assert!(warnings.is_empty());

    assert_eq!(config.split_clients.len(), 1);
    assert_eq!(
        config.split_clients[0].distributions,
        vec![
            Distribution::new("90%", "/internal_location_splits_0_split_0"),
            Distribution::new("10%", "/internal_location_splits_0_split_1"),
        ]
    );

    // One condition map chained into the branch selector
    assert_eq!(config.maps.len(), 2);
    assert_eq!(config.maps[0].source, "$http_x_version");
    assert_eq!(config.maps[1].source, config.maps[0].variable);
    assert_eq!(config.maps[1].variable, "$vs_default_cafe_matches_0");

    let internal: Vec<_> = config.server.locations.iter().filter(|l| l.internal).map(|l| l.path.as_str()).collect();
    assert_eq!(
        internal,
        vec![
            "/internal_location_splits_0_split_0",
            "/internal_location_splits_0_split_1",
            "/internal_location_matches_0_match_0",
            "/internal_location_matches_0_default",
        ]
    );

    assert_eq!(
        config.server.internal_redirect_locations,
        vec![
            InternalRedirectLocation {
                path: "/tea".to_string(),
                destination: "$vs_default_cafe_splits_0".to_string()
            },
            InternalRedirectLocation {
                path: "/coffee".to_string(),
                destination: "$vs_default_cafe_matches_0".to_string()
            },
        ]
    );
}

#[test]
fn test_subroute_upstreams_are_named_after_the_route() {
    let (config, _) = compile(&common::cafe_virtual_server());

    let names: Vec<_> = config.upstreams.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "vs_default_cafe_tea-v1",
            "vs_default_cafe_tea-v2",
            "vs_default_cafe_vsr_default_coffee_coffee-v1",
            "vs_default_cafe_vsr_default_coffee_coffee-v2",
        ]
    );

    let coffee_v2 = config.server.locations.iter().find(|l| l.path == "/internal_location_matches_0_match_0").unwrap();
    assert!(coffee_v2.is_vsr);
    assert_eq!(coffee_v2.proxy_pass, "http://vs_default_cafe_vsr_default_coffee_coffee-v2$request_uri");
}

#[test]
fn test_compile_is_deterministic() {
    let renderer = JsonRenderer::new();
    let vs_ex = common::cafe_virtual_server();

    let first = renderer.render_virtual_server(&compile(&vs_ex).0).unwrap();
    let second = renderer.render_virtual_server(&compile(&vs_ex.clone()).0).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_missing_subroute_is_skipped() {
    let mut vs_ex = common::cafe_virtual_server();
    vs_ex.virtual_server_routes.clear();

    let (config, _) = compile(&vs_ex);

    assert!(config.maps.is_empty());
    assert_eq!(config.server.internal_redirect_locations.len(), 1);
    assert!(!config.server.locations.iter().any(|l| l.path.starts_with("/coffee")));
}

proptest! {
    #[test]
    fn test_tea_split_weights_sum_to_one_hundred(first in 1i64..100) {
        let mut vs_ex = common::cafe_virtual_server();
        vs_ex.virtual_server.spec.routes[0].splits =
            vec![Split::new(first, Action::pass("tea-v1")), Split::new(100 - first, Action::pass("tea-v2"))];

        let (config, _) = compile(&vs_ex);

        let total: i64 = config.split_clients[0]
            .distributions
            .iter()
            .filter_map(|d| d.weight.trim_end_matches('%').parse::<i64>().ok())
            .sum();
        prop_assert_eq!(total, 100);
        prop_assert_eq!(config.split_clients[0].distributions[0].weight.clone(), format!("{}%", first));
    }
}
