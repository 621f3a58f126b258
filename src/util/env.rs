//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Legacy (read-only) store DSN.
pub fn source_db_url() -> anyhow::Result<String> {
    env_opt("SOURCE_DATABASE_URL")
        .map(|v| v.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("missing env var SOURCE_DATABASE_URL"))
}

/// Target store DSN. Tries the specific key first, then the generic one.
pub fn target_db_url() -> anyhow::Result<String> {
    for k in ["TARGET_DATABASE_URL", "DATABASE_URL"] {
        if let Some(v) = env_opt(k) {
            info!(key = k, "target database URL resolved");
            return Ok(v.trim().to_string());
        }
    }
    anyhow::bail!("missing env var TARGET_DATABASE_URL (or DATABASE_URL)")
}

/// Best-effort redaction for DSNs so we don't leak credentials into logs.
/// Host/port/db and query params are preserved.
pub fn redact_postgres_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut u) => {
            let scheme = u.scheme().to_ascii_lowercase();
            if scheme == "postgres" || scheme == "postgresql" {
                let _ = u.set_username("***");
                let _ = u.set_password(Some("***"));
            }
            u.to_string()
        }
        Err(_) => {
            if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
                if let Some(proto) = raw.find("//") {
                    if let Some(at) = raw[proto + 2..].find('@') {
                        let host_part = &raw[proto + 2 + at + 1..];
                        return format!("{}***:{}", &raw[..proto + 2], host_part);
                    }
                }
                return "postgres://***".to_string();
            }
            raw.to_string()
        }
    }
}
