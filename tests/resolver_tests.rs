//! Integration tests for dependency resolution

use jelly::registry::memory::MemoryRegistry;
use jelly::registry::{PackageAttrs, VersionEntry};
use jelly::resolver::ROOT_REQUIRER;
use jelly::{PackageId, Resolver, Version};
use std::collections::BTreeMap;

fn entry(id: &str, version: &str, deps: &[(&str, &str)]) -> VersionEntry {
    let id: PackageId = id.parse().unwrap();
    let mut dependencies = BTreeMap::new();
    for (dep, range) in deps {
        dependencies.insert(dep.parse().unwrap(), range.to_string());
    }

    VersionEntry {
        package: PackageAttrs {
            scope: id.scope().to_string(),
            name: id.name().to_string(),
            version: version.to_string(),
            realm: None,
            description: None,
            license: None,
            authors: Vec::new(),
            repository: None,
            homepage: None,
        },
        dependencies,
        server_dependencies: BTreeMap::new(),
        dev_dependencies: BTreeMap::new(),
    }
}

fn direct(entries: &[(&str, &str)]) -> BTreeMap<PackageId, String> {
    entries
        .iter()
        .map(|(id, range)| (id.parse().unwrap(), range.to_string()))
        .collect()
}

#[test]
fn test_resolve_single_dependency() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("osyris/logging", "1.0.0", &[]));
    registry.publish(entry("osyris/logging", "1.2.0", &[]));
    registry.publish(entry("osyris/logging", "2.0.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver
        .resolve_tree(&direct(&[("osyris/logging", "^1.0.0")]))
        .unwrap();

    assert!(result.conflicts.is_empty());
    let node = &result.graph.nodes[&"osyris/logging".parse().unwrap()];
    assert_eq!(node.version, Version::new(1, 2, 0));
    assert_eq!(
        node.url,
        "https://api.wally.run/v1/package-contents/osyris/logging/1.2.0"
    );
}

#[test]
fn test_resolve_multiple_constraint_forms() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/logging", "1.0.0", &[]));
    registry.publish(entry("a/logging", "1.5.0", &[]));
    registry.publish(entry("a/logging", "2.0.0", &[]));
    registry.publish(entry("b/http", "2.1.0", &[]));
    registry.publish(entry("b/http", "2.1.5", &[]));
    registry.publish(entry("b/http", "2.2.0", &[]));
    registry.publish(entry("c/utils", "2.9.9", &[]));
    registry.publish(entry("c/utils", "3.0.0", &[]));
    registry.publish(entry("c/utils", "3.1.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver
        .resolve_tree(&direct(&[
            ("a/logging", "^1.0.0"),
            ("b/http", "~2.1.0"),
            ("c/utils", "3.0.0"),
        ]))
        .unwrap();

    let nodes = &result.graph.nodes;
    assert_eq!(
        nodes[&"a/logging".parse().unwrap()].version,
        Version::new(1, 5, 0)
    );
    assert_eq!(
        nodes[&"b/http".parse().unwrap()].version,
        Version::new(2, 1, 5)
    );
    assert_eq!(
        nodes[&"c/utils".parse().unwrap()].version,
        Version::new(3, 0, 0)
    );
}

#[test]
fn test_transitive_chain() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/top", "1.0.0", &[("b/mid", "^1.0.0")]));
    registry.publish(entry("b/mid", "1.1.0", &[("c/leaf", "^0.3.0")]));
    registry.publish(entry("c/leaf", "0.3.4", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver.resolve_tree(&direct(&[("a/top", "^1.0.0")])).unwrap();

    assert_eq!(result.graph.nodes.len(), 3);
    assert!(result.conflicts.is_empty());
}

#[test]
fn test_intersection_conflict_reports_both_requirers() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/x", "1.5.2", &[]));
    registry.publish(entry("a/x", "1.4.3", &[]));
    registry.publish(entry("a/x", "1.2.0", &[]));
    registry.publish(entry("b/y", "2.0.0", &[("a/x", "^1.5.0")]));

    let resolver = Resolver::new(&registry);
    let result = resolver
        .resolve_tree(&direct(&[("a/x", "^1.2.0"), ("b/y", "^2.0.0")]))
        .unwrap();

    assert_eq!(
        result.graph.nodes[&"a/x".parse().unwrap()].version,
        Version::new(1, 5, 2)
    );

    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.id.to_string(), "a/x");
    assert_eq!(conflict.resolved, Some(Version::new(1, 5, 2)));
    assert_eq!(conflict.required_by.len(), 2);
    assert!(conflict
        .required_by
        .contains(&(ROOT_REQUIRER.to_string(), "^1.2.0".to_string())));
    assert!(conflict
        .required_by
        .contains(&("b/y".to_string(), "^1.5.0".to_string())));
}

#[test]
fn test_unsatisfiable_leaves_other_branches_alone() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/x", "1.4.3", &[]));
    registry.publish(entry("a/x", "1.2.0", &[]));
    registry.publish(entry("b/y", "2.0.0", &[("a/x", "^1.5.0")]));
    registry.publish(entry("c/z", "1.0.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver
        .resolve_tree(&direct(&[
            ("a/x", "^1.2.0"),
            ("b/y", "^2.0.0"),
            ("c/z", "^1.0.0"),
        ]))
        .unwrap();

    assert!(!result.graph.nodes.contains_key(&"a/x".parse().unwrap()));
    assert!(result.graph.nodes.contains_key(&"b/y".parse().unwrap()));
    assert!(result.graph.nodes.contains_key(&"c/z".parse().unwrap()));

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].resolved, None);
}

#[test]
fn test_same_range_twice_is_not_a_conflict() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/app", "1.0.0", &[("c/shared", "^1.0.0")]));
    registry.publish(entry("b/lib", "1.0.0", &[("c/shared", "^1.0.0")]));
    registry.publish(entry("c/shared", "1.3.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver
        .resolve_tree(&direct(&[("a/app", "^1.0.0"), ("b/lib", "^1.0.0")]))
        .unwrap();

    assert!(result.conflicts.is_empty());
    assert_eq!(
        result.graph.nodes[&"c/shared".parse().unwrap()].version,
        Version::new(1, 3, 0)
    );
}

#[test]
fn test_dev_dependencies_of_transitive_packages_not_followed() {
    let mut registry = MemoryRegistry::new();

    let mut lib = entry("a/lib", "1.0.0", &[]);
    lib.dev_dependencies
        .insert("t/testez".parse().unwrap(), "^0.4.0".to_string());
    registry.publish(lib);

    let resolver = Resolver::new(&registry);
    let result = resolver.resolve_tree(&direct(&[("a/lib", "^1.0.0")])).unwrap();

    assert_eq!(result.graph.nodes.len(), 1);
    assert!(!result.graph.nodes.contains_key(&"t/testez".parse().unwrap()));
}

#[test]
fn test_server_dependencies_followed_transitively() {
    let mut registry = MemoryRegistry::new();

    let mut lib = entry("a/lib", "1.0.0", &[]);
    lib.server_dependencies
        .insert("s/store".parse().unwrap(), "^2.0.0".to_string());
    registry.publish(lib);
    registry.publish(entry("s/store", "2.4.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver.resolve_tree(&direct(&[("a/lib", "^1.0.0")])).unwrap();

    assert_eq!(result.graph.nodes.len(), 2);
    assert_eq!(
        result.graph.nodes[&"s/store".parse().unwrap()].version,
        Version::new(2, 4, 0)
    );
}

#[test]
fn test_highest_compatible_is_always_picked() {
    let mut registry = MemoryRegistry::new();
    for version in ["1.0.0", "1.0.5", "1.2.0", "1.4.9", "2.0.0"] {
        registry.publish(entry("a/x", version, &[]));
    }

    let resolver = Resolver::new(&registry);
    let resolution = resolver
        .resolve_one(&"a/x".parse().unwrap(), "^1.0.0")
        .unwrap();

    // Every other satisfying version is lower
    assert_eq!(resolution.version, Version::new(1, 4, 9));
}

#[test]
fn test_graph_deps_recorded_verbatim() {
    let mut registry = MemoryRegistry::new();
    registry.publish(entry("a/app", "1.0.0", &[("b/lib", "^2.0.0")]));
    registry.publish(entry("b/lib", "2.0.0", &[]));

    let resolver = Resolver::new(&registry);
    let result = resolver.resolve_tree(&direct(&[("a/app", "1.0.0")])).unwrap();

    let app = &result.graph.nodes[&"a/app".parse().unwrap()];
    assert_eq!(
        app.deps.get(&"b/lib".parse().unwrap()).map(String::as_str),
        Some("^2.0.0")
    );
}
