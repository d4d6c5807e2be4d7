use spin_proto::Role;

#[test]
fn test_example_config_is_valid() {
    let path = format!("{}/../spind.toml", env!("CARGO_MANIFEST_DIR"));
    let contents = std::fs::read_to_string(path).unwrap();
    let config: spind::Config = toml::from_str(&contents).unwrap();

    assert_eq!(config.endpoint.role, Role::Server);
    assert_eq!(config.endpoint.listen, "0.0.0.0:4784".parse().unwrap());
    assert!(config.endpoint.peer.is_none());
    assert!(config.observability.observation_path.is_none());
    assert!(config.check());
}

#[test]
fn test_help_message() {
    let help = spind::config::long_help_message();
    assert!(help.starts_with("spind - "));
    assert!(help.contains("--config=PATH"));
    assert!(help.contains("--log-level=LOG_LEVEL"));
}
