use std::env;

use dotenvy::dotenv;

/// Runtime configuration, read once at startup from the environment (a
/// local `.env` file is honored when present).
#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub bind_addr: String,
    /// Shared API token. `None` disables request authorization, which is
    /// only sensible for local development.
    pub bot_token: Option<String>,
    /// Exact origin allowed by CORS; `None` means any origin.
    pub allowed_origin: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        let _ = dotenv();
        Self {
            mongodb_uri: env::var("FAIRSPLIT_MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database: env::var("FAIRSPLIT_DATABASE").unwrap_or_else(|_| "FairSplit".to_string()),
            bind_addr: env::var("FAIRSPLIT_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            bot_token: env::var("FAIRSPLIT_BOT_TOKEN").ok(),
            allowed_origin: env::var("FAIRSPLIT_ALLOWED_ORIGIN").ok(),
        }
    }
}
