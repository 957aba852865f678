use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub store: Store,
    pub auth: Auth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub bind_address: String,
}

/// Which table store implementation backs the services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    #[serde(default)]
    pub secret: String,
    pub token_lifetime_minutes: i64,
    pub bcrypt_cost: u32,
}

impl Settings {
    /// Defaults, then `config.toml` if present, then `STOREFRONT_*` variables
    /// (`STOREFRONT_STORE__URL`, `STOREFRONT_AUTH__SECRET`, ...)
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("STOREFRONT")
                .prefix_separator("_")
                .separator("__"),
        );

        Self::load(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind_address", "0.0.0.0:8000")?
            .set_default("store.backend", "supabase")?
            .set_default("auth.token_lifetime_minutes", 30)?
            .set_default("auth.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the services cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Supabase {
            if self.store.url.trim().is_empty() {
                return Err(ConfigError::Message("store.url is required for the supabase backend".into()));
            }
            if self.store.key.trim().is_empty() {
                return Err(ConfigError::Message("store.key is required for the supabase backend".into()));
            }
        }
        if self.auth.secret.is_empty() {
            return Err(ConfigError::Message("auth.secret must not be empty".into()));
        }
        if self.auth.token_lifetime_minutes <= 0 {
            return Err(ConfigError::Message("auth.token_lifetime_minutes must be positive".into()));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Message("auth.bcrypt_cost must be between 4 and 31".into()));
        }
        Ok(())
    }
}
