use provision_core::{FeatureId, ProvisionError};
use provision_resolver::{parse_descriptor, Blacklist, FeatureIndex, Resolver};

const REPO: &str = r#"<features name="versions" xmlns="http://karaf.apache.org/xmlns/features/v1.2.0">
    <feature name="f2" version="0.1"><bundle>mvn:org.example/f2/0.1</bundle></feature>
    <feature name="f2" version="0.2"><bundle>mvn:org.example/f2/0.2</bundle></feature>
    <feature name="app" version="1.0">
        <feature version="[0.1,0.2)">f2</feature>
        <feature>cycle-a</feature>
        <bundle>mvn:org.example/app/1.0</bundle>
        <bundle>mvn:org.bad/evil/1.0</bundle>
        <conditional>
            <condition>webconsole</condition>
            <bundle>mvn:org.example/app-console/1.0</bundle>
        </conditional>
    </feature>
    <feature name="cycle-a" version="1.0"><feature>cycle-b</feature></feature>
    <feature name="cycle-b" version="1.0"><feature>cycle-a</feature></feature>
    <feature name="webconsole" version="4.0"/>
    <feature name="broken" version="1.0"><feature>nowhere</feature></feature>
</features>"#;

fn index(blacklist: &Blacklist) -> FeatureIndex {
    let repository = parse_descriptor("memory:versions", REPO.as_bytes()).unwrap();
    FeatureIndex::build([&repository], blacklist)
}

#[test]
fn test_highest_version_wins() {
    let index = index(&Blacklist::default());

    assert_eq!(index.get("f2", "[0.1,0.3)").unwrap().unwrap().version(), "0.2");
    assert_eq!(index.get("f2", "0.0.0").unwrap().unwrap().version(), "0.2");
    assert_eq!(index.get("f2", "0.1").unwrap().unwrap().version(), "0.1");
    assert!(index.get("f2", "0.3").unwrap().is_none());
    assert!(index.get("nothing", "0.0.0").unwrap().is_none());
}

#[test]
fn test_plan_orders_dependencies_and_skips_blacklisted_bundles() {
    let blacklist = Blacklist::new(["mvn:org.bad/*"]).unwrap();
    let index = index(&blacklist);
    let resolver = Resolver::new(&index, &blacklist);

    let plan = resolver.resolve(&FeatureId::new("app", "1.0"), &[]).unwrap();
    let ids: Vec<String> = plan.feature_ids().iter().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["f2/0.1", "cycle-b/1.0", "cycle-a/1.0", "app/1.0"]);

    let locations: Vec<&str> = plan.bundles().map(|(_, b)| b.location.as_str()).collect();
    assert_eq!(locations, vec!["mvn:org.example/f2/0.1", "mvn:org.example/app/1.0"]);
}

#[test]
fn test_conditional_follows_installed_features() {
    let blacklist = Blacklist::default();
    let index = index(&blacklist);
    let resolver = Resolver::new(&index, &blacklist);
    let app = FeatureId::new("app", "1.0");

    let plan = resolver.resolve(&app, &[]).unwrap();
    assert!(!plan.features().iter().any(|p| p.conditional_of.is_some()));

    let console = index.get("webconsole", "4.0").unwrap().unwrap();
    let plan = resolver.resolve(&app, &[console]).unwrap();
    let conditional = plan.features().iter().find(|p| p.conditional_of.is_some()).unwrap();
    assert_eq!(conditional.feature.name(), "app-condition-webconsole");
    assert_eq!(conditional.conditional_of, Some(app));
}

#[test]
fn test_missing_dependency_is_not_found() {
    let blacklist = Blacklist::default();
    let index = index(&blacklist);
    let err = Resolver::new(&index, &blacklist)
        .resolve(&FeatureId::named("broken"), &[])
        .unwrap_err();
    assert!(matches!(err, ProvisionError::FeatureNotFound { ref name, .. } if name == "nowhere"));
}
