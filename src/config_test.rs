use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const REQUIRED: [(&str, &str); 2] = [("DATABASE_URL", "postgres://localhost/rollcall"), ("JWT_SECRET", "s3cret")];

#[test]
fn defaults_apply_when_optional_vars_absent() {
    let config = Config::from_lookup(lookup_from(&REQUIRED)).expect("config should parse");
    assert_eq!(config.database_url, "postgres://localhost/rollcall");
    assert_eq!(config.jwt_secret, "s3cret");
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(config.persist_timeout, Duration::from_millis(DEFAULT_PERSIST_TIMEOUT_MS));
    assert_eq!(config.client_queue_capacity, DEFAULT_CLIENT_QUEUE_CAPACITY);
}

#[test]
fn overrides_are_parsed() {
    let mut pairs = REQUIRED.to_vec();
    pairs.extend([
        ("PORT", "8080"),
        ("DB_MAX_CONNECTIONS", "12"),
        ("PERSIST_TIMEOUT_MS", "250"),
        ("CLIENT_QUEUE_CAPACITY", "32"),
    ]);
    let config = Config::from_lookup(lookup_from(&pairs)).expect("config should parse");
    assert_eq!(config.port, 8080);
    assert_eq!(config.db_max_connections, 12);
    assert_eq!(config.persist_timeout, Duration::from_millis(250));
    assert_eq!(config.client_queue_capacity, 32);
}

#[test]
fn missing_database_url_is_reported() {
    let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
}

#[test]
fn blank_jwt_secret_counts_as_missing() {
    let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "  ")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
}

#[test]
fn invalid_port_is_an_error() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("PORT", "http"));
    let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
}

#[test]
fn unparseable_optional_falls_back_to_default() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("PERSIST_TIMEOUT_MS", "soon"));
    let config = Config::from_lookup(lookup_from(&pairs)).expect("config should parse");
    assert_eq!(config.persist_timeout, Duration::from_millis(DEFAULT_PERSIST_TIMEOUT_MS));
}

#[test]
fn zero_queue_capacity_is_clamped() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("CLIENT_QUEUE_CAPACITY", "0"));
    let config = Config::from_lookup(lookup_from(&pairs)).expect("config should parse");
    assert_eq!(config.client_queue_capacity, 1);
}
