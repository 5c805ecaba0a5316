use provision_core::{LogLevel, ProvisionError, ServiceConfig};
use tempfile::tempdir;

#[test]
fn test_base_dir_layout() {
    let dir = tempdir().unwrap();
    let config = ServiceConfig::with_base_dir(dir.path());
    assert_eq!(config.profiles_dir, dir.path().join("profiles"));
    assert_eq!(config.config_storage, Some(dir.path().join("etc")));
    assert!(config.validate().is_ok());
}

#[test]
fn test_blank_entries_rejected() {
    let err = ServiceConfig::from_toml(r#"repositories = ["  "]"#).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(_)));

    let err = ServiceConfig::from_toml(r#"blacklist = [""]"#).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(_)));
}

#[test]
fn test_toml_round_trip() {
    let mut config = ServiceConfig::with_base_dir("/opt/provision");
    config.log_level = LogLevel::Trace;
    config.boot_features = "shell,ssh;version=1.0".to_string();

    let parsed = ServiceConfig::from_toml(&config.to_toml().unwrap()).unwrap();
    assert_eq!(parsed, config);
}
