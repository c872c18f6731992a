use std::collections::HashMap;

use cvitanok_core::Config;
use cvitanok_core::config::ConfigError;
use jsonwebtoken::Algorithm;

fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    Config::from_map(&vars.iter().copied().collect::<HashMap<_, _>>())
}

// ═══ Defaults ═══

#[test]
fn test_defaults() {
    let config = config(&[]).unwrap();
    assert_eq!(config.project_name, "Cvitanok");
    assert_eq!(config.api_v1_prefix, "/api/v1");
    assert_eq!(config.token_algorithm, Algorithm::HS256);
    assert_eq!(config.access_token_expire_minutes, 30);
    assert_eq!(config.server_port, 8000);
    assert_eq!(config.min_password_length, 8);
    assert_eq!(config.redis_url, None);
    assert_eq!(config.task_result_backend, None);
    assert!(config.auto_migrate);
    assert!(config.is_dev());
    assert_eq!(config.server_addr(), "127.0.0.1:8000");
    assert_eq!(
        config.cors_origins,
        vec!["http://localhost:3000", "http://localhost:8000"]
    );
}

// ═══ Overrides ═══

#[test]
fn test_overrides() {
    let config = config(&[
        ("PROJECT_NAME", "Shop"),
        ("SERVER_HOST", "0.0.0.0"),
        ("SERVER_PORT", "9000"),
        ("ENVIRONMENT", "production"),
        ("ALGORITHM", "HS512"),
        ("AUTO_MIGRATE", "off"),
        ("REDIS_URL", "redis://cache:6379"),
        ("TASK_RESULT_BACKEND", ""),
        ("BACKEND_CORS_ORIGINS", "https://a.test, https://b.test/"),
    ])
    .unwrap();

    assert_eq!(config.project_name, "Shop");
    assert_eq!(config.server_addr(), "0.0.0.0:9000");
    assert!(!config.is_dev());
    assert_eq!(config.token_algorithm, Algorithm::HS512);
    assert!(!config.auto_migrate);
    assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    assert_eq!(config.task_result_backend, None);
    assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
}

#[test]
fn test_origins_as_json_list() {
    let config = config(&[("BACKEND_CORS_ORIGINS", r#"["https://a.test", "*"]"#)]).unwrap();
    assert_eq!(config.cors_origins, vec!["https://a.test", "*"]);
}

// ═══ Invalid values ═══

#[test]
fn test_invalid_values_name_the_variable() {
    for (var, value) in [
        ("SERVER_PORT", "eighty"),
        ("ACCESS_TOKEN_EXPIRE_MINUTES", "0"),
        ("ALGORITHM", "RS256"),
        ("AUTO_MIGRATE", "perhaps"),
        ("MIN_PASSWORD_LENGTH", "-1"),
        ("BACKEND_CORS_ORIGINS", "[oops"),
    ] {
        match config(&[(var, value)]) {
            Err(ConfigError::Invalid { var: reported, .. }) => assert_eq!(reported, var),
            Ok(_) => panic!("{var}={value} should be rejected"),
        }
    }
}
