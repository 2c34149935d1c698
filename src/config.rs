use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Database pool
    pub db_max_connections: u32,

    // Frontend bundle served at "/"
    pub static_dir: String,

    // Security
    pub session_secret: Secret<String>,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            db_max_connections: config.get("db_max_connections").unwrap_or(20),

            static_dir: config
                .get("static_dir")
                .unwrap_or_else(|_| "web/static".to_string()),

            session_secret: Secret::new(config.get("session_secret")?),
            secure_cookies: config.get("secure_cookies").unwrap_or(true),
        })
    }
}
