use std::io::Write;
use std::time::Duration;

use keygate_auth::password::hash_password;
use keygate_server::config::loader::load_config;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_auth_section_from_toml() {
    let hash = hash_password("s3cret-pass").expect("hash");
    let file = write_config(&format!(
        r#"
[logging]
level = "debug"

[auth]
issuer = "https://auth.example.com"
audience = "orders-api"

[auth.tokens]
access_token_lifetime = "5m"
refresh_token_lifetime = "1day"

[auth.signing]
algorithm = "HS256"
secret = "0123456789abcdef0123456789abcdef"

[auth.rate_limiting]
anonymous_per_window = 10
user_per_window = 20
admin_per_window = 30
window = "30s"

[[auth.users]]
username = "alice"
password_hash = "{hash}"
roles = ["ROLE_USER"]
"#
    ));

    let cfg = load_config(file.path().to_str()).expect("load config");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.auth.issuer, "https://auth.example.com");
    assert_eq!(cfg.auth.audience, "orders-api");
    assert_eq!(
        cfg.auth.tokens.access_token_lifetime,
        Duration::from_secs(300)
    );
    assert_eq!(
        cfg.auth.tokens.refresh_token_lifetime,
        Duration::from_secs(86_400)
    );
    assert_eq!(cfg.auth.signing.algorithm, "HS256");
    assert_eq!(cfg.auth.rate_limiting.anonymous_per_window, 10);
    assert_eq!(cfg.auth.rate_limiting.user_per_window, 20);
    assert_eq!(cfg.auth.rate_limiting.admin_per_window, 30);
    assert_eq!(cfg.auth.rate_limiting.window, Duration::from_secs(30));
    assert_eq!(cfg.auth.users.len(), 1);
    assert_eq!(cfg.auth.users[0].roles, vec!["ROLE_USER".to_string()]);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let cfg = load_config(Some("/nonexistent/keygate.toml")).expect("defaults");
    assert_eq!(cfg.auth.audience, "keygate-api");
    assert_eq!(cfg.auth.rate_limiting.anonymous_per_window, 60);
    assert_eq!(cfg.auth.rate_limiting.user_per_window, 200);
    assert_eq!(cfg.auth.rate_limiting.admin_per_window, 1000);
    assert_eq!(
        cfg.auth.revocation.sweep_interval,
        Duration::from_secs(3600)
    );
}

#[test]
fn environment_overrides_file() {
    let file = write_config(
        r#"
[server]
port = 8181
"#,
    );

    // SAFETY: this is the only test in the binary touching this variable.
    unsafe { std::env::set_var("KEYGATE__SERVER__PORT", "9191") };
    let cfg = load_config(file.path().to_str());
    unsafe { std::env::remove_var("KEYGATE__SERVER__PORT") };

    assert_eq!(cfg.expect("load config").server.port, 9191);
}

#[test]
fn short_secret_is_rejected() {
    let file = write_config(
        r#"
[auth.signing]
algorithm = "HS256"
secret = "too-short"
"#,
    );

    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.contains("auth config error"), "got: {err}");
    assert!(err.contains("32 bytes"), "got: {err}");
}

#[test]
fn unknown_algorithm_is_rejected() {
    let file = write_config(
        r#"
[auth.signing]
algorithm = "none"
"#,
    );

    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.contains("signing algorithm"), "got: {err}");
}

#[test]
fn invalid_log_level_is_rejected() {
    let file = write_config(
        r#"
[logging]
level = "loud"
"#,
    );

    assert!(load_config(file.path().to_str()).is_err());
}
