use provision_resolver::Blacklist;

const FRAMEWORK: &str = "mvn:org.apache.karaf.features1/framework";

#[test]
fn test_repository_blacklisted_by_range() {
    let blacklist = Blacklist::new([format!("{}/[1.0.0,3.0.0)/xml/features;type=repository", FRAMEWORK)]).unwrap();

    assert!(blacklist.is_repository_blacklisted(&format!("{}/1.0.0/xml/features", FRAMEWORK)));
    assert!(blacklist.is_repository_blacklisted(&format!("{}/2.0.0/xml/features", FRAMEWORK)));
    assert!(!blacklist.is_repository_blacklisted(&format!("{}/3.0.0/xml/features", FRAMEWORK)));
}

#[test]
fn test_rule_of_another_type_never_blacklists_repositories() {
    let blacklist = Blacklist::new([
        "mvn:org.apache.karaf.features1/framework/*/xml/features;type=notRepository",
        "mvn:org.apache.karaf.features2/framework/*/xml/features;type=repository",
    ])
    .unwrap();

    assert!(!blacklist.is_repository_blacklisted(&format!("{}/1.0.0/xml/features", FRAMEWORK)));
    assert!(blacklist.is_repository_blacklisted("mvn:org.apache.karaf.features2/framework/1.0.0/xml/features"));
}

#[test]
fn test_patterns_are_kept() {
    let blacklist = Blacklist::new(["ssh", "  ", "mvn:org.bad/*"]).unwrap();
    assert_eq!(blacklist.patterns().collect::<Vec<_>>(), vec!["ssh", "mvn:org.bad/*"]);
}
