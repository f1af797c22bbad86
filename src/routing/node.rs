//! The route tree as a sum type.

use crate::domain::{Action, ActionProxy, Condition, Match, Route, Split};

/// One node of a route tree. Splits and matches nest other nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteNode {
    Proxy { action: Action },
    Redirect { url: String, code: i64 },
    Return { code: i64, content_type: String, body: String },
    Split(Vec<WeightedBranch>),
    Match { branches: Vec<ConditionalBranch>, default: Box<RouteNode> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBranch {
    pub weight: i64,
    pub node: RouteNode,
}

/// Branch taken when every condition holds
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub conditions: Vec<Condition>,
    pub node: RouteNode,
}

impl RouteNode {
    /// Node for a single action. A redirect or return wins over proxying.
    pub fn from_action(action: &Action) -> Self {
        if let Some(redirect) = &action.redirect {
            return RouteNode::Redirect { url: redirect.url.clone(), code: redirect.code };
        }
        if let Some(ret) = &action.return_ {
            return RouteNode::Return {
                code: ret.code,
                content_type: ret.content_type.clone(),
                body: ret.body.clone(),
            };
        }
        RouteNode::Proxy { action: action.clone() }
    }

    fn from_splits(splits: &[Split]) -> Option<Self> {
        let branches = splits
            .iter()
            .map(|s| {
                s.action
                    .as_ref()
                    .map(|action| WeightedBranch { weight: s.weight, node: RouteNode::from_action(action) })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(RouteNode::Split(branches))
    }

    /// Node for an action or a split list, whichever is set
    fn from_target(action: Option<&Action>, splits: &[Split]) -> Option<Self> {
        if !splits.is_empty() {
            return Self::from_splits(splits);
        }
        action.map(RouteNode::from_action)
    }

    fn from_match(m: &Match) -> Option<ConditionalBranch> {
        let node = Self::from_target(m.action.as_ref(), &m.splits)?;
        Some(ConditionalBranch { conditions: m.conditions.clone(), node })
    }

    /// Tree of a route. `None` for a delegating route or one with no
    /// target, both of which admission rejects before compile.
    pub fn from_route(route: &Route) -> Option<Self> {
        if !route.route.is_empty() {
            return None;
        }

        if !route.matches.is_empty() {
            let mut branches = Vec::with_capacity(route.matches.len());
            for m in &route.matches {
                // the root map is keyed on each branch's first condition
                if m.conditions.is_empty() {
                    tracing::warn!(path = %route.path, "Skipping match without conditions");
                    continue;
                }
                branches.push(Self::from_match(m)?);
            }
            let default = Self::from_target(route.action.as_ref(), &route.splits)?;
            if branches.is_empty() {
                return Some(default);
            }
            return Some(RouteNode::Match { branches, default: Box::new(default) });
        }

        Self::from_target(route.action.as_ref(), &route.splits)
    }

    /// Proxy settings of a proxying node
    pub fn proxy(&self) -> Option<&ActionProxy> {
        match self {
            RouteNode::Proxy { action } => action.proxy.as_ref(),
            _ => None,
        }
    }

    /// Sum of branch weights of a split node
    pub fn total_weight(&self) -> Option<i64> {
        match self {
            RouteNode::Split(branches) => Some(branches.iter().map(|b| b.weight).sum()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_from_route_split() {
        let route = Route {
            path: "/tea".to_string(),
            splits: vec![Split::new(90, Action::pass("tea-v1")), Split::new(10, Action::pass("tea-v2"))],
            ..Default::default()
        };
        let node = RouteNode::from_route(&route).unwrap();
        assert_eq!(node.total_weight(), Some(100));
        match node {
            RouteNode::Split(branches) => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(&branches[0].node, RouteNode::Proxy { action } if action.pass == "tea-v1"));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_from_route_match_with_split_default() {
        let route = Route {
            path: "/coffee".to_string(),
            matches: vec![Match {
                conditions: vec![Condition::header("x-version", "v2")],
                action: Some(Action::pass("coffee-v2")),
                splits: vec![],
            }],
            splits: vec![Split::new(50, Action::pass("a")), Split::new(50, Action::pass("b"))],
            ..Default::default()
        };
        match RouteNode::from_route(&route).unwrap() {
            RouteNode::Match { branches, default } => {
                assert_eq!(branches.len(), 1);
                assert_eq!(default.total_weight(), Some(100));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[traced_test]
    #[test]
    fn test_from_route_skips_matches_without_conditions() {
        let unconditional = Match { conditions: vec![], action: Some(Action::pass("tea-v2")), splits: vec![] };
        let conditional = Match {
            conditions: vec![Condition::header("x-version", "v2")],
            action: Some(Action::pass("coffee-v2")),
            splits: vec![],
        };
        let route = |matches: Vec<Match>| Route {
            path: "/tea".to_string(),
            matches,
            action: Some(Action::pass("tea-v1")),
            ..Default::default()
        };

        match RouteNode::from_route(&route(vec![unconditional.clone(), conditional])).unwrap() {
            RouteNode::Match { branches, .. } => {
                assert_eq!(branches.len(), 1);
                assert!(matches!(&branches[0].node, RouteNode::Proxy { action } if action.pass == "coffee-v2"));
            }
            other => panic!("unexpected node {:?}", other),
        }
        assert!(logs_contain("Skipping match without conditions"));

        let only_unconditional = RouteNode::from_route(&route(vec![unconditional])).unwrap();
        assert!(matches!(only_unconditional, RouteNode::Proxy { action } if action.pass == "tea-v1"));
    }

    #[test]
    fn test_from_route_rejects_delegation_and_empty() {
        let delegating = Route { path: "/coffee".to_string(), route: "coffee".to_string(), ..Default::default() };
        assert!(RouteNode::from_route(&delegating).is_none());
        assert!(RouteNode::from_route(&Route::default()).is_none());
    }

    #[test]
    fn test_from_action_prefers_redirect_and_return() {
        assert!(matches!(
            RouteNode::from_action(&Action::redirect("http://example.com", 302)),
            RouteNode::Redirect { code: 302, .. }
        ));
        assert!(matches!(
            RouteNode::from_action(&Action::returns(200, "text/plain", "ok")),
            RouteNode::Return { code: 200, .. }
        ));
    }
}
