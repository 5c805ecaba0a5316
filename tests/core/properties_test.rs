use provision_core::properties;

#[test]
fn test_parse_java_properties() {
    let props = properties::parse(
        "# comment\n! also a comment\nkey1 = value1\nkey2:value2\nmulti = a \\\n    b\nescaped\\ key = x\\=y\n",
    );
    assert_eq!(props["key1"], "value1");
    assert_eq!(props["key2"], "value2");
    assert_eq!(props["multi"], "a b");
    assert_eq!(props["escaped key"], "x=y");
}

#[test]
fn test_marker_keys_survive_serialization() {
    let mut props = properties::Properties::new();
    props.insert("#deleted#".to_string(), String::new());
    props.insert("url".to_string(), "http://host:8080/a=b".to_string());

    let parsed = properties::from_bytes(&properties::to_bytes(&props)).unwrap();
    assert_eq!(parsed, props);
}
