//! Trie-based hierarchical router.
//!
//! Routes are dot-segmented paths (`user.created`, `user.*`, `**`) combined
//! with a target, a priority in `[-100, 100]`, and an optional predicate
//! matcher. [`Router::route`] walks a trie segment-by-segment, collecting
//! every handler and satisfied matcher reachable from the signal's type, and
//! returns them ordered by `(complexity desc, priority desc)` with stable
//! insertion-order tie-breaks.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::DispatchConfig;
use crate::error::{JidoError, Result, RoutingError};
use crate::signal::{validate_path, Signal};

/// What a route resolves to: either an action to execute locally, or a
/// dispatch target to deliver the signal onward.
#[derive(Debug, Clone)]
pub enum Target {
    Action { module: String, params: Value },
    Dispatch(DispatchConfig),
}

impl Target {
    pub fn action(module: impl Into<String>, params: Value) -> Self {
        Target::Action {
            module: module.into(),
            params,
        }
    }
}

/// A predicate over a [`Signal`], used by predicate-gated routes ("matchers").
#[derive(Clone)]
pub struct Matcher(pub Arc<dyn Fn(&Signal) -> bool + Send + Sync>);

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Matcher(<predicate>)")
    }
}

impl Matcher {
    pub fn new(f: impl Fn(&Signal) -> bool + Send + Sync + 'static) -> Self {
        Matcher(Arc::new(f))
    }

    /// Evaluate the predicate; a panic inside it counts as `false`, matching
    /// the "exceptions in predicates count as false" rule.
    fn evaluate(&self, signal: &Signal) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)(signal))).unwrap_or(false)
    }
}

/// A registered route: path pattern, target, priority, and optional
/// predicate.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: String,
    pub target: Target,
    pub priority: i32,
    pub matcher: Option<Matcher>,
}

impl Route {
    pub fn new(path: impl Into<String>, target: Target) -> Self {
        Self {
            path: path.into(),
            target,
            priority: 0,
            matcher: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    fn validate(&self) -> Result<()> {
        validate_path(&self.path)
            .map_err(|e| JidoError::Routing(RoutingError::InvalidPath(self.path.clone(), e.to_string())))?;
        if !(-100..=100).contains(&self.priority) {
            return Err(JidoError::Routing(RoutingError::InvalidPriority(self.priority)));
        }
        if let Some(matcher) = &self.matcher {
            let probe = probe_signal();
            // Calling it here is only a validation smoke test; a panic here
            // surfaces as invalid_match_function, same as a panic during
            // real routing counts as a non-match.
            let ok = catch_unwind(AssertUnwindSafe(|| (matcher.0)(&probe)));
            if ok.is_err() {
                return Err(JidoError::Routing(RoutingError::InvalidMatchFunction(
                    self.path.clone(),
                    "predicate panicked on probe signal".to_string(),
                )));
            }
        }
        Ok(())
    }
}

fn probe_signal() -> Signal {
    Signal::new(
        crate::id::Id::nil(),
        "jido.route.probe",
        "router",
        Value::Null,
    )
    .expect("canonical probe signal is always well-formed")
}

/// How "specific" a registered path is: literal segments score highest,
/// `*` scores lower, `**` scores lowest, weighted toward the head of the
/// path so earlier differences dominate.
fn complexity(path: &str) -> i64 {
    let segments: Vec<&str> = path.split('.').collect();
    let len = segments.len() as i64;
    let mut score = len * 10;
    for (i, segment) in segments.iter().enumerate() {
        let position_weight = len - i as i64;
        score += match *segment {
            "**" => -50 * position_weight,
            "*" => -10 * position_weight,
            _ => 20 * position_weight,
        };
    }
    score
}

#[derive(Debug, Clone)]
struct HandlerInfo {
    target: Target,
    priority: i32,
    complexity: i64,
    seq: usize,
    matcher: Option<Matcher>,
}

#[derive(Default)]
struct TrieNode {
    literal: HashMap<String, TrieNode>,
    single: Option<Box<TrieNode>>,
    multi: Option<Box<TrieNode>>,
    entries: Vec<HandlerInfo>,
}

impl TrieNode {
    fn new() -> Self {
        Self::default()
    }

    fn child_for_segment(&mut self, segment: &str) -> &mut TrieNode {
        match segment {
            "*" => self.single.get_or_insert_with(|| Box::new(TrieNode::new())),
            "**" => self.multi.get_or_insert_with(|| Box::new(TrieNode::new())),
            lit => self.literal.entry(lit.to_string()).or_insert_with(TrieNode::new),
        }
    }
}

/// Trie over dot-segmented paths matching literal, `*`, and `**` segments.
pub struct Router {
    root: TrieNode,
    routes: Vec<Route>,
    next_seq: usize,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let mut router = Router {
            root: TrieNode::new(),
            routes: Vec::new(),
            next_seq: 0,
        };
        for route in routes {
            router.add_one(route)?;
        }
        Ok(router)
    }

    /// Add one or more routes, returning the number successfully added.
    pub fn add(&mut self, routes: Vec<Route>) -> Result<usize> {
        let mut added = 0;
        for route in routes {
            self.add_one(route)?;
            added += 1;
        }
        Ok(added)
    }

    fn add_one(&mut self, route: Route) -> Result<()> {
        route.validate()?;
        let segments: Vec<&str> = route.path.split('.').collect();
        let mut node = &mut self.root;
        for segment in &segments {
            node = node.child_for_segment(segment);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        node.entries.push(HandlerInfo {
            target: route.target.clone(),
            priority: route.priority,
            complexity: complexity(&route.path),
            seq,
            matcher: route.matcher.clone(),
        });
        self.routes.push(route);
        Ok(())
    }

    /// Remove every route registered under the given path(s).
    pub fn remove(&mut self, paths: Vec<String>) {
        for path in &paths {
            self.remove_one(path);
        }
    }

    fn remove_one(&mut self, path: &str) {
        self.routes.retain(|r| r.path != path);
        let segments: Vec<&str> = path.split('.').collect();
        remove_path(&mut self.root, &segments, path);
    }

    /// List all registered routes in stable insertion order.
    pub fn list(&self) -> Vec<Route> {
        self.routes.clone()
    }

    /// Merge two routers, producing a new one with every route from both
    /// (in `a` then `b` insertion order).
    pub fn merge(a: &Router, b: &Router) -> Result<Router> {
        let mut routes = a.list();
        routes.extend(b.list());
        Router::new(routes)
    }

    /// Route a signal, returning matching targets ordered by
    /// `(complexity desc, priority desc)`, ties broken by insertion order.
    pub fn route(&self, signal: &Signal) -> Result<Vec<Target>> {
        let segments: Vec<&str> = signal.signal_type.split('.').collect();
        let mut collected: Vec<&HandlerInfo> = Vec::new();
        collect(&self.root, &segments, signal, &mut collected);
        if collected.is_empty() {
            return Err(JidoError::Routing(RoutingError::NoHandler(
                signal.signal_type.clone(),
            )));
        }
        collected.sort_by(|a, b| {
            b.complexity
                .cmp(&a.complexity)
                .then(b.priority.cmp(&a.priority))
                .then(a.seq.cmp(&b.seq))
        });
        Ok(collected.into_iter().map(|h| h.target.clone()).collect())
    }

    /// Number of leaves carrying at least one handler/matcher.
    pub fn route_count(&self) -> usize {
        count_leaves(&self.root)
    }
}

fn collect<'a>(node: &'a TrieNode, remaining: &[&str], signal: &Signal, out: &mut Vec<&'a HandlerInfo>) {
    if remaining.is_empty() {
        for entry in &node.entries {
            match &entry.matcher {
                None => out.push(entry),
                Some(m) if m.evaluate(signal) => out.push(entry),
                Some(_) => {}
            }
        }
        if let Some(multi) = &node.multi {
            collect(multi, &[], signal, out);
        }
        return;
    }
    let (head, rest) = (remaining[0], &remaining[1..]);
    if let Some(lit) = node.literal.get(head) {
        collect(lit, rest, signal, out);
    }
    if let Some(single) = &node.single {
        collect(single, rest, signal, out);
    }
    if let Some(multi) = &node.multi {
        for k in 0..=remaining.len() {
            collect(multi, &remaining[k..], signal, out);
        }
    }
}

fn remove_path(node: &mut TrieNode, segments: &[&str], _path: &str) {
    if segments.is_empty() {
        node.entries.clear();
        return;
    }
    match segments[0] {
        "*" => {
            if let Some(single) = node.single.as_mut() {
                remove_path(single, &segments[1..], _path);
            }
        }
        "**" => {
            if let Some(multi) = node.multi.as_mut() {
                remove_path(multi, &segments[1..], _path);
            }
        }
        lit => {
            if let Some(child) = node.literal.get_mut(lit) {
                remove_path(child, &segments[1..], _path);
            }
        }
    }
}

fn count_leaves(node: &TrieNode) -> usize {
    let mut count = if node.entries.is_empty() { 0 } else { 1 };
    for child in node.literal.values() {
        count += count_leaves(child);
    }
    if let Some(single) = &node.single {
        count += count_leaves(single);
    }
    if let Some(multi) = &node.multi {
        count += count_leaves(multi);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal(signal_type: &str) -> Signal {
        Signal::new(crate::id::Id::nil(), signal_type, "test", json!({})).unwrap()
    }

    fn action_route(path: &str) -> Route {
        Route::new(path, Target::action(path, json!({})))
    }

    #[test]
    fn router_specificity_orders_literal_before_wildcards() {
        let router = Router::new(vec![
            action_route("**"),
            action_route("user.*"),
            action_route("user.created"),
        ])
        .unwrap();
        let targets = router.route(&signal("user.created")).unwrap();
        let paths: Vec<String> = targets
            .iter()
            .map(|t| match t {
                Target::Action { module, .. } => module.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(paths, vec!["user.created", "user.*", "**"]);
    }

    #[test]
    fn single_wildcard_matches_exactly_one_segment() {
        let router = Router::new(vec![action_route("user.*")]).unwrap();
        assert!(router.route(&signal("user.created")).is_ok());
        assert!(router.route(&signal("user.created.extra")).is_err());
    }

    #[test]
    fn multi_wildcard_matches_zero_or_more() {
        let router = Router::new(vec![action_route("user.**")]).unwrap();
        assert!(router.route(&signal("user")).is_ok()); // "**" matches zero segments, so "user" alone matches
        assert!(router.route(&signal("user.created")).is_ok());
        assert!(router.route(&signal("user.created.nested.deep")).is_ok());
    }

    #[test]
    fn bare_multi_wildcard_matches_everything_including_itself() {
        let router = Router::new(vec![action_route("**")]).unwrap();
        assert!(router.route(&signal("anything")).is_ok());
        assert!(router.route(&signal("anything.at.all")).is_ok());
    }

    #[test]
    fn no_handler_is_an_error() {
        let router = Router::new(vec![action_route("user.created")]).unwrap();
        assert!(router.route(&signal("order.created")).is_err());
    }

    #[test]
    fn invalid_priority_rejected_at_add_time() {
        let route = action_route("user.created").with_priority(200);
        assert!(Router::new(vec![route]).is_err());
    }

    #[test]
    fn predicate_matcher_gates_delivery() {
        let router = Router::new(vec![Route::new(
            "order.created",
            Target::action("order.created", json!({})),
        )
        .with_matcher(Matcher::new(|s| s.data["urgent"] == json!(true)))])
        .unwrap();

        let mut urgent = signal("order.created");
        urgent.data = json!({"urgent": true});
        assert!(router.route(&urgent).is_ok());

        let calm = signal("order.created");
        assert!(router.route(&calm).is_err());
    }

    #[test]
    fn panicking_predicate_counts_as_false() {
        let router = Router::new(vec![Route::new(
            "order.created",
            Target::action("order.created", json!({})),
        )
        .with_matcher(Matcher::new(|_| panic!("boom")))])
        .unwrap();
        assert!(router.route(&signal("order.created")).is_err());
    }

    #[test]
    fn route_count_matches_leaves_with_handlers() {
        let router =
            Router::new(vec![action_route("user.created"), action_route("user.*")]).unwrap();
        assert_eq!(router.route_count(), 2);
    }

    #[test]
    fn remove_drops_matching_routes() {
        let mut router = Router::new(vec![action_route("user.created")]).unwrap();
        router.remove(vec!["user.created".to_string()]);
        assert!(router.route(&signal("user.created")).is_err());
        assert_eq!(router.list().len(), 0);
    }

    #[test]
    fn merge_combines_two_routers() {
        let a = Router::new(vec![action_route("a.one")]).unwrap();
        let b = Router::new(vec![action_route("b.two")]).unwrap();
        let merged = Router::merge(&a, &b).unwrap();
        assert!(merged.route(&signal("a.one")).is_ok());
        assert!(merged.route(&signal("b.two")).is_ok());
    }
}
