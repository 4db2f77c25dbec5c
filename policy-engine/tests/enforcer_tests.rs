//! Decision pipeline, persistence and concurrency tests for the enforcer

use policy_engine::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

/// Adapter whose incremental writes always fail
struct BrokenAdapter {
    attempts: Arc<AtomicUsize>,
}

impl Adapter for BrokenAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>> {
        Ok(Vec::new())
    }

    fn save_policy(&self, _rows: &[PolicyRow]) -> Result<()> {
        Err(PolicyError::Adapter("disk full".to_string()))
    }

    fn add_policy(&self, _section: &str, _tuple: &Tuple) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PolicyError::Adapter("disk full".to_string()))
    }
}

fn deny_schema() -> Schema {
    Schema::builder()
        .policy_section("p", 4)
        .role_section("g")
        .request_arity(3)
        .build()
        .unwrap()
}

#[test]
fn test_deny_override_with_effect_field() {
    let e = Enforcer::builder()
        .schema(deny_schema())
        .matcher(RbacMatcher::rbac().with_effect_field(3))
        .effector(EffectPolicy::DenyOverride)
        .build()
        .unwrap();

    e.add_policies([
        ["data_group_admin", "data1", "write", "allow"],
        ["bob", "data1", "write", "deny"],
    ])
    .unwrap();
    e.add_grouping_policy(["bob", "data_group_admin"]).unwrap();
    e.add_grouping_policy(["alice", "data_group_admin"]).unwrap();

    assert!(e.enforce(&["alice", "data1", "write"]).unwrap());
    assert!(!e.enforce(&["bob", "data1", "write"]).unwrap());
    // Deny-override allows when nothing matches
    assert!(e.enforce(&["carol", "data9", "read"]).unwrap());

    let (allowed, rule) = e.enforce_with_explain(&["bob", "data1", "write"]).unwrap();
    assert!(!allowed);
    assert_eq!(rule, Some(Tuple::from(["bob", "data1", "write", "deny"])));
}

#[test]
fn test_priority_effect_follows_store_order() {
    let e = Enforcer::builder()
        .schema(deny_schema())
        .matcher(RbacMatcher::rbac().with_effect_field(3))
        .effector(EffectPolicy::Priority)
        .build()
        .unwrap();

    e.add_policy(["alice", "data1", "read", "deny"]).unwrap();
    e.add_policy(["alice", "data1", "read", "allow"]).unwrap();
    assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());

    e.remove_policy(["alice", "data1", "read", "deny"]).unwrap();
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
}

#[test]
fn test_explain_names_the_granting_rule() {
    let e = Enforcer::new().unwrap();
    e.add_policy(["data2_admin", "data2", "read"]).unwrap();
    e.add_role_for_user("alice", "data2_admin").unwrap();

    let (allowed, rule) = e.enforce_with_explain(&["alice", "data2", "read"]).unwrap();
    assert!(allowed);
    assert_eq!(rule, Some(Tuple::from(["data2_admin", "data2", "read"])));

    let (allowed, rule) = e.enforce_with_explain(&["alice", "data1", "read"]).unwrap();
    assert!(!allowed);
    assert!(rule.is_none());
}

#[test]
fn test_disabled_enforcer_allows_everything() {
    let mut e = Enforcer::new().unwrap();
    e.enable_enforce(false);
    assert!(e.enforce(&["anyone", "anything", "any"]).unwrap());
    e.enable_enforce(true);
    assert!(!e.enforce(&["anyone", "anything", "any"]).unwrap());
}

#[test]
fn test_fn_matcher_prefix_objects() {
    let e = Enforcer::builder()
        .matcher(FnMatcher::new("p", |req, rule, roles| {
            rule.field(0).is_some_and(|sub| roles.has_role("g", &req[0], sub))
                && rule.field(1).is_some_and(|prefix| req[1].starts_with(prefix))
                && rule.field(2) == Some(req[2].as_str())
        }))
        .build()
        .unwrap();

    e.add_policy(["reader", "/records/", "read"]).unwrap();
    e.add_role_for_user("alice", "reader").unwrap();

    assert!(e.enforce(&["alice", "/records/42", "read"]).unwrap());
    assert!(!e.enforce(&["alice", "/billing/42", "read"]).unwrap());
}

#[test]
fn test_batch_enforce() {
    let e = Enforcer::new().unwrap();
    e.add_policy(["alice", "data1", "read"]).unwrap();

    let decisions = e
        .batch_enforce(&[vec!["alice", "data1", "read"], vec!["bob", "data1", "read"]])
        .unwrap();
    assert_eq!(decisions, vec![true, false]);
}

#[test]
fn test_memory_adapter_tracks_mutations() {
    let adapter = Arc::new(MemoryAdapter::with_rows([
        ("p".to_string(), Tuple::from(["alice", "data1", "read"])),
        ("g".to_string(), Tuple::from(["bob", "admin"])),
    ]));
    let e = Enforcer::builder()
        .adapter(SharedAdapter(adapter.clone()))
        .build()
        .unwrap();

    assert!(e.has_role_for_user("bob", "admin"));

    e.add_policy(["admin", "data2", "write"]).unwrap();
    e.remove_policy(["alice", "data1", "read"]).unwrap();
    e.remove_filtered_grouping_policy(0, ["bob"]).unwrap();

    assert_eq!(
        adapter.rows(),
        vec![("p".to_string(), Tuple::from(["admin", "data2", "write"]))]
    );
}

#[test]
fn test_auto_save_failure_keeps_memory_state() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut e = Enforcer::with_adapter(BrokenAdapter {
        attempts: attempts.clone(),
    })
    .unwrap();

    let result = e.add_policy(["alice", "data1", "read"]);
    assert!(matches!(result, Err(PolicyError::Adapter(_))));
    // The in-memory change stands; only persistence failed
    assert!(e.has_policy(["alice", "data1", "read"]));
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // Removal falls back to the default and is silently skipped
    assert!(e.remove_policy(["alice", "data1", "read"]).unwrap());

    e.enable_auto_save(false);
    assert!(e.add_policy(["bob", "data2", "write"]).unwrap());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    assert!(matches!(e.save_policy(), Err(PolicyError::Adapter(_))));
}

#[test]
fn test_load_policy_is_atomic() {
    let e = Enforcer::with_adapter(TextAdapter::new("p, alice, data1, read\ng, alice, admin\n")).unwrap();
    assert_eq!(e.get_policy().len(), 1);

    let mut e = e;
    e.set_adapter(TextAdapter::new("p, bob, data2, write\np, broken, row\n"));
    assert!(matches!(e.load_policy(), Err(PolicyError::ArityMismatch { .. })));

    // Previous state survives a rejected load
    assert!(e.has_policy(["alice", "data1", "read"]));
    assert!(e.has_role_for_user("alice", "admin"));

    e.set_adapter(TextAdapter::new("p, bob, data2, write\nq, x, y\n"));
    assert!(matches!(e.load_policy(), Err(PolicyError::UnknownSection(_))));

    e.set_adapter(TextAdapter::new("p, bob, data2, write\np, bob, data2, write\n"));
    e.load_policy().unwrap();
    assert_eq!(e.get_policy(), vec![Tuple::from(["bob", "data2", "write"])]);
    assert!(e.get_roles_for_user("alice").is_empty());
}

#[test]
fn test_build_fails_on_bad_initial_load() {
    let result = Enforcer::with_adapter(TextAdapter::new("p, alice\n"));
    assert!(matches!(result, Err(PolicyError::ArityMismatch { .. })));
}

#[test]
fn test_manual_role_links() {
    let mut e = Enforcer::new().unwrap();
    e.enable_auto_build_role_links(false);
    e.add_policy(["admin", "data1", "read"]).unwrap();
    e.add_grouping_policy(["alice", "admin"]).unwrap();

    assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
    e.build_role_links();
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
}

#[test]
fn test_clear_policy() {
    let e = Enforcer::with_adapter(TextAdapter::new("p, alice, data1, read\ng, bob, alice\n")).unwrap();
    e.clear_policy();

    assert!(e.get_policy().is_empty());
    assert!(e.get_grouping_policy().is_empty());
    assert!(e.get_implicit_roles_for_user("bob").is_empty());

    // Reload restores from the adapter
    e.load_policy().unwrap();
    assert!(e.enforce(&["bob", "data1", "read"]).unwrap());
}

#[test]
fn test_from_engine_config() {
    let config = EngineConfig::from_yaml("enable_cache: true\nmax_role_depth: 1\n").unwrap();
    let e = Enforcer::builder().config(&config).unwrap().build().unwrap();

    e.add_policy(["top", "data1", "read"]).unwrap();
    e.add_grouping_policies([["alice", "mid"], ["mid", "top"]]).unwrap();

    // Two hops exceed the configured depth
    assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
    assert!(e.enforce(&["mid", "data1", "read"]).unwrap());
}

#[test]
fn test_concurrent_reads_and_writes() {
    let e = Enforcer::builder().with_cache().build().unwrap();
    e.add_policy(["reader", "doc", "read"]).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let e = &e;
            scope.spawn(move || {
                for i in 0..50 {
                    let user = format!("user{worker}_{i}");
                    e.add_role_for_user(&user, "reader").unwrap();
                    assert!(e.enforce(&[user.as_str(), "doc", "read"]).unwrap());
                }
            });
        }
        for _ in 0..2 {
            let e = &e;
            scope.spawn(move || {
                for _ in 0..100 {
                    assert!(!e.enforce(&["stranger", "doc", "read"]).unwrap());
                }
            });
        }
    });

    assert_eq!(e.get_users_for_role("reader").len(), 200);
    assert_eq!(e.get_grouping_policy().len(), 200);
}

#[test]
fn test_cached_decision_never_outlives_a_racing_write() {
    for _ in 0..500 {
        let e = Enforcer::builder().with_cache().build().unwrap();
        let start = Barrier::new(2);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                start.wait();
                e.enforce(&["alice", "data1", "read"]).unwrap();
            });
            scope.spawn(|| {
                start.wait();
                e.add_policy(["alice", "data1", "read"]).unwrap();
            });
        });
        assert!(e.enforce(&["alice", "data1", "read"]).unwrap());

        std::thread::scope(|scope| {
            scope.spawn(|| {
                start.wait();
                e.enforce(&["alice", "data1", "read"]).unwrap();
            });
            scope.spawn(|| {
                start.wait();
                e.remove_policy(["alice", "data1", "read"]).unwrap();
            });
        });
        assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
    }
}

#[test]
fn test_racing_grouping_writes_keep_store_and_graph_in_step() {
    let e = Enforcer::builder().with_cache().build().unwrap();
    e.add_policy(["admin", "data1", "read"]).unwrap();
    let start = Barrier::new(2);

    for _ in 0..2000 {
        std::thread::scope(|scope| {
            scope.spawn(|| {
                start.wait();
                e.add_grouping_policy(["alice", "admin"]).unwrap();
            });
            scope.spawn(|| {
                start.wait();
                e.remove_grouping_policy(["alice", "admin"]).unwrap();
            });
        });

        let stored = e.has_grouping_policy(["alice", "admin"]);
        assert_eq!(stored, e.has_role_for_user("alice", "admin"));
        assert_eq!(stored, e.enforce(&["alice", "data1", "read"]).unwrap());
    }
}

#[test]
fn test_cache_keeps_requests_with_commas_apart() {
    let e = Enforcer::builder().with_cache().build().unwrap();
    e.add_policy(["a,b", "c", "read"]).unwrap();

    assert!(e.enforce(&["a,b", "c", "read"]).unwrap());
    assert!(!e.enforce(&["a", "b,c", "read"]).unwrap());
    assert!(e.enforce(&["a,b", "c", "read"]).unwrap());
}

/// Lets a test keep a handle on the adapter it hands to the enforcer
struct SharedAdapter(Arc<MemoryAdapter>);

impl Adapter for SharedAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>> {
        self.0.load_policy()
    }

    fn save_policy(&self, rows: &[PolicyRow]) -> Result<()> {
        self.0.save_policy(rows)
    }

    fn add_policy(&self, section: &str, tuple: &Tuple) -> Result<()> {
        self.0.add_policy(section, tuple)
    }

    fn remove_policy(&self, section: &str, tuple: &Tuple) -> Result<()> {
        self.0.remove_policy(section, tuple)
    }

    fn remove_filtered_policy(&self, section: &str, filter: &FieldFilter) -> Result<()> {
        self.0.remove_filtered_policy(section, filter)
    }
}
