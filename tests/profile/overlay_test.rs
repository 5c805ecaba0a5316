use std::collections::BTreeMap;
use provision_core::ProvisionError;
use provision_profile::{effective, overlay, default_resolvers, Profile, DELETED};

fn index(profiles: &[&Profile]) -> BTreeMap<String, Profile> {
    profiles.iter().map(|p| (p.id().to_string(), (*p).clone())).collect()
}

fn family() -> (Profile, Profile, Profile) {
    let first = Profile::builder("first")
        .add_configuration_value("org.example", "shared", "first")
        .add_configuration_value("org.example", "from-first", "1")
        .build()
        .unwrap();
    let second = Profile::builder("second")
        .add_configuration_value("org.example", "shared", "second")
        .add_configuration_value("org.example", "from-second", "2")
        .build()
        .unwrap();
    let child = Profile::builder("child")
        .add_parents(["first", "second"])
        .add_configuration_value("org.example", "shared", "child")
        .build()
        .unwrap();
    (first, second, child)
}

#[test]
fn test_child_wins_over_every_parent() {
    let (first, second, child) = family();
    let all = index(&[&first, &second, &child]);

    let merged = overlay(&child, &all, None).unwrap();
    let config = merged.configuration("org.example").unwrap();
    assert_eq!(config["shared"], "child");
    assert_eq!(config["from-first"], "1");
    assert_eq!(config["from-second"], "2");

    // parent order decides between parents only
    let reordered = Profile::builder("child")
        .add_parents(["second", "first"])
        .add_configuration_value("org.example", "shared", "child")
        .build()
        .unwrap();
    let merged = overlay(&reordered, &all, None).unwrap();
    assert_eq!(merged.configuration("org.example").unwrap()["shared"], "child");

    let orphan = Profile::builder("child").add_parents(["second", "first"]).build().unwrap();
    let merged = overlay(&orphan, &all, None).unwrap();
    assert_eq!(merged.configuration("org.example").unwrap()["shared"], "first");
}

#[test]
fn test_overlay_of_overlay_is_unchanged() {
    let (first, second, child) = family();
    let all = index(&[&first, &second, &child]);

    let once = overlay(&child, &all, None).unwrap();
    assert_eq!(overlay(&once, &all, None).unwrap(), once);
    assert_eq!(overlay(&once, &BTreeMap::new(), Some("prod")).unwrap(), once);
}

#[test]
fn test_overlay_keeps_only_own_attributes() {
    let base = Profile::builder("base")
        .add_attribute("abstract", "true")
        .add_attribute("hidden", "true")
        .add_configuration_value("org.example", "port", "8181")
        .build()
        .unwrap();
    let app = Profile::builder("app")
        .add_parent("base")
        .add_attribute("owner", "ops")
        .build()
        .unwrap();
    let all = index(&[&base, &app]);

    let merged = overlay(&app, &all, None).unwrap();
    let attributes = merged.attributes();
    assert_eq!(attributes.get("owner").map(String::as_str), Some("ops"));
    assert_eq!(attributes.get("overlay").map(String::as_str), Some("true"));
    assert!(!attributes.contains_key("abstract"));
    assert!(!attributes.contains_key("hidden"));
    assert_eq!(merged.configuration("org.example").unwrap()["port"], "8181");
    assert_eq!(merged.parent_ids(), ["base"]);
}

#[test]
fn test_reset_marker_clears_inherited_file() {
    let (first, second, _) = family();
    let child = Profile::builder("child")
        .add_parents(["first", "second"])
        .add_configuration_value("org.example", DELETED, "")
        .add_configuration_value("org.example", "only", "mine")
        .build()
        .unwrap();
    let all = index(&[&first, &second, &child]);

    let merged = overlay(&child, &all, None).unwrap();
    let config = merged.configuration("org.example").unwrap();
    assert_eq!(config.len(), 1);
    assert_eq!(config["only"], "mine");
}

#[test]
fn test_cycles_fail_fast() {
    let a = Profile::builder("a").add_parent("c").build().unwrap();
    let b = Profile::builder("b").add_parent("a").build().unwrap();
    let c = Profile::builder("c").add_parent("b").build().unwrap();
    let all = index(&[&a, &b, &c]);

    let err = overlay(&a, &all, None).unwrap_err();
    assert!(matches!(err, ProvisionError::ProfileCycle(chain) if chain == "a -> b -> c"));
}

#[test]
fn test_effective_substitutes_across_pids() {
    let (first, second, _) = family();
    let child = Profile::builder("child")
        .add_parents(["first", "second"])
        .add_configuration_value("app", "label", "${profile:org.example/from-second}-${unknown}")
        .build()
        .unwrap();
    let all = index(&[&first, &second, &child]);
    let merged = overlay(&child, &all, None).unwrap();

    let kept = effective(&merged, &default_resolvers(), false).unwrap();
    assert_eq!(kept.configuration("app").unwrap()["label"], "2-${unknown}");

    let cleared = effective(&merged, &default_resolvers(), true).unwrap();
    assert_eq!(cleared.configuration("app").unwrap()["label"], "2-");
}
