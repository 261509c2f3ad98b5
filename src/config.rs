use anyhow::{Context, Result};
use clap::Parser;
use std::env;

const ENV_PREFIX: &str = "FILE_PROCESSOR_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base of the URLs handed out for stored objects.
    pub public_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "JPEG/PDF file processor API")]
pub struct Args {
    /// Host to bind to (overrides FILE_PROCESSOR_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_PROCESSOR_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file payloads are stored (overrides FILE_PROCESSOR_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILE_PROCESSOR_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for stored objects (overrides FILE_PROCESSOR_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |key| env::var(format!("{ENV_PREFIX}{key}")))?;
        Ok((cfg, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let env_host = lookup("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match lookup("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing {ENV_PREFIX}PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).with_context(|| format!("reading {ENV_PREFIX}PORT")),
        };
        let env_storage = lookup("STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db =
            lookup("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/meta/files.db".into());

        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| lookup("PUBLIC_URL").ok())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let cfg = AppConfig::merge(Args::default(), lookup_from(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.storage_dir, "./data/objects");
        assert_eq!(cfg.database_url, "sqlite://./data/meta/files.db");
        assert_eq!(cfg.public_url, "http://localhost:3000");
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            storage_dir: Some("/srv/objects".into()),
            ..Args::default()
        };
        let cfg = AppConfig::merge(
            args,
            lookup_from(&[("PORT", "9000"), ("HOST", "127.0.0.1"), ("STORAGE_DIR", "/tmp/x")]),
        )
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.storage_dir, "/srv/objects");
        assert_eq!(cfg.public_url, "http://localhost:8080");
    }

    #[test]
    fn env_public_url_is_used() {
        let cfg = AppConfig::merge(
            Args::default(),
            lookup_from(&[("PUBLIC_URL", "https://files.example.com")]),
        )
        .unwrap();
        assert_eq!(cfg.public_url, "https://files.example.com");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = AppConfig::merge(Args::default(), lookup_from(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("FILE_PROCESSOR_PORT"));
    }
}
