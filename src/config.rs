use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Which backing store holds the medication table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// A Google spreadsheet (the first worksheet).
    Google,
    /// A local snapshot file.
    File,
    /// An in-process table that is lost on exit.
    Memory,
}

/// Command line for the dashboard server. Every flag can also be set from
/// the environment.
#[derive(Debug, Parser)]
#[command(
    name = "medication-dashboard",
    version,
    about = "Senior medication dashboard backed by a spreadsheet"
)]
pub struct Cli {
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "DASHBOARD_BACKEND", value_enum, default_value_t = Backend::Google)]
    pub backend: Backend,

    /// Spreadsheet identifier, as found in the sheet's URL.
    #[arg(long, env = "SHEET_ID")]
    pub sheet_id: Option<String>,

    /// Service account JSON key with Editor access to the spreadsheet.
    /// Access tokens are minted from it and renewed before they expire.
    #[arg(
        long,
        env = "GOOGLE_APPLICATION_CREDENTIALS",
        conflicts_with_all = ["access_token", "access_token_file"]
    )]
    pub credentials: Option<PathBuf>,

    /// Fixed OAuth bearer token, e.g. from `gcloud auth print-access-token`.
    /// It is not renewed; prefer `--credentials` for a long-running server.
    #[arg(long, env = "SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// File holding a fixed access token, read once at startup.
    #[arg(long, env = "SHEETS_ACCESS_TOKEN_FILE", conflicts_with = "access_token")]
    pub access_token_file: Option<PathBuf>,

    #[arg(long, env = "SHEETS_API_URL", default_value = DEFAULT_SHEETS_API_URL)]
    pub sheets_api_url: String,

    #[arg(long, env = "DASHBOARD_DATA_FILE", default_value = "database/medications.bin.gz")]
    pub data_file: PathBuf,

    /// Idle sessions are forgotten after this many seconds.
    #[arg(long, env = "DASHBOARD_SESSION_TTL", default_value_t = 24 * 60 * 60)]
    pub session_ttl_secs: u64,
}

/// How the Google backend authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum GoogleAuth {
    /// Path to a service account JSON key.
    ServiceAccount(PathBuf),
    AccessToken(String),
}

impl std::fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoogleAuth::ServiceAccount(path) => f.debug_tuple("ServiceAccount").field(path).finish(),
            GoogleAuth::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

/// Backing store selection with everything needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Google {
        sheet_id: String,
        auth: GoogleAuth,
        api_url: String,
    },
    File {
        path: PathBuf,
    },
    Memory,
}

impl StoreConfig {
    /// Identifier shown when the store cannot be opened.
    pub fn identifier(&self) -> String {
        match self {
            StoreConfig::Google { sheet_id, .. } => sheet_id.clone(),
            StoreConfig::File { path } => path.display().to_string(),
            StoreConfig::Memory => "memory".to_string(),
        }
    }
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub store: StoreConfig,
    pub session_ttl: Duration,
}

impl Cli {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let store = match self.backend {
            Backend::Google => {
                let sheet_id = self
                    .sheet_id
                    .filter(|id| !id.trim().is_empty())
                    .ok_or(ConfigError::MissingSheetId)?;
                let auth = match (self.credentials, self.access_token, self.access_token_file) {
                    (Some(path), _, _) => GoogleAuth::ServiceAccount(path),
                    (None, Some(token), _) => GoogleAuth::AccessToken(non_empty_token(&token)?),
                    (None, None, Some(path)) => {
                        let token = std::fs::read_to_string(&path).map_err(|source| {
                            ConfigError::TokenFile {
                                path: path.display().to_string(),
                                source,
                            }
                        })?;
                        GoogleAuth::AccessToken(non_empty_token(&token)?)
                    }
                    (None, None, None) => return Err(ConfigError::MissingCredentials),
                };
                StoreConfig::Google {
                    sheet_id,
                    auth,
                    api_url: self.sheets_api_url,
                }
            }
            Backend::File => StoreConfig::File {
                path: self.data_file,
            },
            Backend::Memory => StoreConfig::Memory,
        };

        Ok(Config {
            bind: self.bind,
            store,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        })
    }
}

fn non_empty_token(token: &str) -> Result<String, ConfigError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::MissingCredentials);
    }
    Ok(token.to_string())
}
