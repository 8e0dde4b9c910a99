use std::time::Duration;
use std::{env, fs};

use tokengate_server::config::loader::load_config;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("tokengate.toml");

    let toml_content = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[auth]
issuer = "https://auth.example.com"
token_ttl = "30m"
refresh_grace = "7d"
leeway = "15s"
required_claims = ["tenant"]

[auth.signing]
algorithm = "HS256"
secret = "{SECRET}"

[auth.blacklist]
store_timeout = "500ms"

[auth.parser]
query_param = "access_token"
"#
    );
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.auth.issuer.as_deref(), Some("https://auth.example.com"));
    assert_eq!(cfg.auth.token_ttl, Duration::from_secs(30 * 60));
    assert_eq!(cfg.auth.refresh_grace, Duration::from_secs(7 * 24 * 3600));
    assert_eq!(cfg.auth.leeway, Duration::from_secs(15));
    assert_eq!(cfg.auth.required_claims, vec!["tenant".to_string()]);
    assert_eq!(cfg.auth.blacklist.store_timeout, Duration::from_millis(500));
    assert_eq!(cfg.auth.parser.query_param.as_deref(), Some("access_token"));
    // Untouched sections keep their defaults
    assert_eq!(cfg.auth.parser.prefix, "bearer");
    assert_eq!(cfg.auth.blacklist.purge_interval, Duration::from_secs(300));

    // 2) Env override should win over file
    unsafe {
        env::set_var("TOKENGATE__AUTH__TOKEN_TTL", "15m");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.auth.token_ttl, Duration::from_secs(15 * 60));
    unsafe {
        env::remove_var("TOKENGATE__AUTH__TOKEN_TTL");
    }

    // 3) A short HMAC secret is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[auth.signing]
algorithm = "HS256"
secret = "too-short"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("auth.signing.secret must be at least"));

    // 4) Asymmetric algorithms need key files
    let missing_keys = dir.path().join("missing_keys.toml");
    fs::write(&missing_keys, "[auth.signing]\nalgorithm = \"ES384\"\n").expect("write toml");
    let err = load_config(missing_keys.to_str()).expect_err("expected missing key error");
    assert!(err.contains("auth.signing.private_key_path"));

    // 5) Unknown algorithm
    let bad_alg = dir.path().join("bad_alg.toml");
    fs::write(&bad_alg, "[auth.signing]\nalgorithm = \"none\"\n").expect("write toml");
    let err = load_config(bad_alg.to_str()).expect_err("expected algorithm error");
    assert!(err.contains("Invalid signing algorithm"));
}

#[test]
fn redacted_config_masks_secret() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("tokengate.toml");
    fs::write(
        &path,
        format!("[auth.signing]\nalgorithm = \"HS256\"\nsecret = \"{SECRET}\"\n"),
    )
    .expect("write toml");

    let cfg = load_config(path.to_str()).expect("should parse config");
    let rendered = toml::to_string_pretty(&cfg.redacted()).expect("render toml");

    assert!(!rendered.contains(SECRET));
    assert!(rendered.contains("********"));
    assert_eq!(cfg.auth.signing.secret.as_deref(), Some(SECRET));
}
