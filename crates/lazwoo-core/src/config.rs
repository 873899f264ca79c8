use std::net::SocketAddr;

use thiserror::Error;

/// Hard ceiling on uploaded spreadsheet size.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Every setting has a default, so the only way configuration fails is a
/// present-but-unparseable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value cannot be parsed. All settings have
/// defaults, so a bare environment is valid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup
/// function, so parsing can be tested with a pure `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let bind_addr = {
        let raw = or_default("LAZWOO_BIND_ADDR", "0.0.0.0:3001");
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: "LAZWOO_BIND_ADDR".to_string(),
                reason: e.to_string(),
            })?
    };

    let log_level = or_default("LAZWOO_LOG_LEVEL", "info");

    let allowed_origins = or_default(
        "LAZWOO_ALLOWED_ORIGINS",
        "https://product.65smarttools.com,http://localhost:5173",
    )
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(ToOwned::to_owned)
    .collect();

    let max_upload_bytes = {
        let raw = or_default(
            "LAZWOO_MAX_UPLOAD_BYTES",
            &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
        );
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: "LAZWOO_MAX_UPLOAD_BYTES".to_string(),
                reason: e.to_string(),
            })?
    };

    Ok(AppConfig {
        bind_addr,
        log_level,
        allowed_origins,
        max_upload_bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn build_app_config_succeeds_with_empty_environment() {
        let map: HashMap<&str, &str> = HashMap::new();
        let cfg = build_app_config(lookup_from_map(&map)).expect("defaults should apply");
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:3001");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(
            cfg.allowed_origins,
            vec![
                "https://product.65smarttools.com".to_string(),
                "http://localhost:5173".to_string(),
            ]
        );
    }

    #[test]
    fn build_app_config_overrides_bind_addr() {
        let mut map = HashMap::new();
        map.insert("LAZWOO_BIND_ADDR", "127.0.0.1:9000");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn build_app_config_fails_with_invalid_bind_addr() {
        let mut map = HashMap::new();
        map.insert("LAZWOO_BIND_ADDR", "not-a-socket-addr");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "LAZWOO_BIND_ADDR"),
            "expected InvalidEnvVar(LAZWOO_BIND_ADDR), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_fails_with_invalid_upload_cap() {
        let mut map = HashMap::new();
        map.insert("LAZWOO_MAX_UPLOAD_BYTES", "not-a-number");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "LAZWOO_MAX_UPLOAD_BYTES"),
            "expected InvalidEnvVar(LAZWOO_MAX_UPLOAD_BYTES), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_splits_and_trims_origins() {
        let mut map = HashMap::new();
        map.insert("LAZWOO_ALLOWED_ORIGINS", "http://a.test , http://b.test,");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(
            cfg.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
