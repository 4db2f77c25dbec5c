use policy_engine::*;

fn chain() -> RoleManager {
    let manager = RoleManager::new();
    manager.add_link("g", "alice", "editor");
    manager.add_link("g", "bob", "editor");
    manager.add_link("g", "editor", "viewer");
    manager.add_link("g", "viewer", "guest");
    manager
}

#[test]
fn test_link_crud() {
    let manager = chain();

    assert!(!manager.add_link("g", "alice", "editor"));
    assert!(manager.has_link("g", "alice", "editor"));
    assert!(!manager.has_link("g", "alice", "viewer"));

    assert_eq!(
        manager.get_all_links("g"),
        vec![
            Tuple::from(["alice", "editor"]),
            Tuple::from(["bob", "editor"]),
            Tuple::from(["editor", "viewer"]),
            Tuple::from(["viewer", "guest"]),
        ]
    );
    assert_eq!(
        manager.get_filtered_links("g", &FieldFilter::new(1, ["editor"])),
        vec![Tuple::from(["alice", "editor"]), Tuple::from(["bob", "editor"])]
    );

    assert!(manager.remove_link("g", "bob", "editor"));
    assert!(!manager.remove_link("g", "bob", "editor"));
    assert_eq!(manager.get_users("g", "editor"), vec!["alice"]);
}

#[test]
fn test_transitive_resolution() {
    let manager = chain();

    assert_eq!(manager.get_reachable("g", "alice"), vec!["editor", "viewer", "guest"]);
    assert!(manager.is_reachable("g", "alice", "guest"));
    assert!(!manager.is_reachable("g", "guest", "alice"));
    assert_eq!(manager.get_roles("g", "alice"), vec!["editor"]);
}

#[test]
fn test_unknown_nodes_and_graphs_are_empty() {
    let manager = chain();

    assert!(manager.get_reachable("g", "nobody").is_empty());
    assert!(manager.get_reachable("g", "guest").is_empty());
    assert!(manager.get_reachable("missing", "alice").is_empty());
    assert!(!manager.is_reachable("missing", "alice", "editor"));
    assert!(!manager.remove_link("missing", "alice", "editor"));
    assert!(manager.get_all_links("missing").is_empty());
    assert!(manager
        .remove_filtered_links("missing", &FieldFilter::new(0, ["alice"]))
        .is_empty());
}

#[test]
fn test_remove_filtered_links_breaks_paths() {
    let manager = chain();

    let removed = manager.remove_filtered_links("g", &FieldFilter::new(0, ["editor"]));
    assert_eq!(removed, vec![Tuple::from(["editor", "viewer"])]);
    assert_eq!(manager.get_reachable("g", "alice"), vec!["editor"]);
    assert!(!manager.is_reachable("g", "bob", "guest"));

    // A window past the edge arity removes nothing
    assert!(manager
        .remove_filtered_links("g", &FieldFilter::new(1, ["guest", "x"]))
        .is_empty());
}

#[test]
fn test_rebuild_replaces_graph() {
    let manager = chain();
    let links = [Tuple::from(["carol", "admin"]), Tuple::from(["bad", "link", "row"])];
    manager.rebuild("g", &links);

    assert_eq!(manager.get_all_links("g"), vec![Tuple::from(["carol", "admin"])]);
    assert!(manager.get_reachable("g", "alice").is_empty());

    manager.clear();
    assert!(manager.graph_names().is_empty());
}

#[test]
fn test_self_loop_and_diamond() {
    let manager = RoleManager::new();
    manager.add_link("g", "a", "a");
    manager.add_link("g", "x", "left");
    manager.add_link("g", "x", "right");
    manager.add_link("g", "left", "top");
    manager.add_link("g", "right", "top");

    assert_eq!(manager.get_reachable("g", "a"), vec!["a"]);
    // Diamond paths report the shared ancestor once
    assert_eq!(manager.get_reachable("g", "x"), vec!["left", "right", "top"]);
}

#[test]
fn test_concurrent_resolution() {
    let manager = chain();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    assert!(manager.is_reachable("g", "alice", "guest"));
                }
            });
        }
        scope.spawn(|| {
            for i in 0..200 {
                manager.add_link("g", &format!("user{i}"), "viewer");
            }
        });
    });

    assert_eq!(manager.get_users("g", "viewer").len(), 201);
}
