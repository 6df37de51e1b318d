use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Where forum access checks are answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorySource {
    CoreApi(String),
    RosterFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub directory: DirectorySource,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host: String = try_load("FELICITY_HOST", "0.0.0.0")?;
        let port: u16 = try_load("FELICITY_PORT", "4000")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let jwt_secret = env::var("FELICITY_JWT_SECRET").unwrap_or_else(|_| {
            warn!("FELICITY_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.into()
        });

        // A roster file wins so development never depends on a running core API
        let directory = match (env::var("FELICITY_DIRECTORY_FILE"), env::var("FELICITY_CORE_URL")) {
            (Ok(path), _) => DirectorySource::RosterFile(PathBuf::from(path)),
            (Err(_), Ok(url)) => DirectorySource::CoreApi(url),
            (Err(_), Err(_)) => bail!("set FELICITY_CORE_URL or FELICITY_DIRECTORY_FILE"),
        };

        Ok(Self {
            addr,
            db_path: try_load("FELICITY_DB_PATH", "felicity.db")?,
            jwt_secret,
            directory,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} value '{raw}': {e}"))
}
