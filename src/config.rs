use std::env;
use std::net::SocketAddr;

const DEFAULT_DATABASE_URL: &str = "sqlite:data/journal.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Mark the session cookie `Secure`. Enable when served over HTTPS.
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| format!("Invalid BIND_ADDR '{bind_addr}': {e}"))?;

        let secure_cookies = match env::var("SECURE_COOKIES") {
            Ok(v) => parse_flag(&v).ok_or_else(|| format!("Invalid SECURE_COOKIES '{v}'"))?,
            Err(_) => false,
        };

        Ok(Self {
            database_url,
            bind_addr,
            secure_cookies,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
