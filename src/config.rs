use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Port used when `PORT` is not provided.
pub const DEFAULT_PORT: u16 = 5001;

/// Converter command used when `DOCLING_COMMAND` is not provided.
pub const DEFAULT_DOCLING_COMMAND: &str = "docling";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the conversion service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on (all interfaces).
    pub server_port: u16,
    /// Program that runs the Docling converter.
    pub docling_program: String,
    /// Arguments placed between the program and the source path.
    pub docling_leading_args: Vec<String>,
    /// Extra arguments appended to every conversion.
    pub docling_extra_args: Vec<String>,
    /// Directory for staged uploads; `None` uses the system temp directory.
    pub staging_dir: Option<PathBuf>,
    /// Maximum accepted request body size; `None` disables the limit.
    pub max_upload_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            docling_program: DEFAULT_DOCLING_COMMAND.to_string(),
            docling_leading_args: Vec::new(),
            docling_extra_args: Vec::new(),
            staging_dir: None,
            max_upload_bytes: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset so that `PORT=` in a `.env` file falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let load = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let server_port = load("PORT")
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".into()))
            })
            .transpose()?
            .unwrap_or(defaults.server_port);

        let (docling_program, docling_leading_args) = match load("DOCLING_COMMAND") {
            Some(command) => split_command(&command)
                .ok_or_else(|| ConfigError::InvalidValue("DOCLING_COMMAND".into()))?,
            None => (defaults.docling_program, defaults.docling_leading_args),
        };

        let docling_extra_args = load("DOCLING_ARGS")
            .map(|value| split_words(&value))
            .unwrap_or_default();

        let max_upload_bytes = load("MAX_UPLOAD_BYTES")
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("MAX_UPLOAD_BYTES".into()))
            })
            .transpose()?;

        Ok(Self {
            server_port,
            docling_program,
            docling_leading_args,
            docling_extra_args,
            staging_dir: load("STAGING_DIR").map(PathBuf::from),
            max_upload_bytes,
        })
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn split_command(value: &str) -> Option<(String, Vec<String>)> {
    let mut words = split_words(value).into_iter();
    let program = words.next()?;
    Some((program, words.collect()))
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the process-wide cache.
///
/// `.env` must already be loaded by the caller; `main` does so before tracing starts so that
/// `RUST_LOG` from the file applies. Later calls return the configuration cached by the first one.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    let config = Config::from_env()?;
    tracing::debug!(
        server_port = config.server_port,
        docling_program = %config.docling_program,
        staging_dir = ?config.staging_dir,
        max_upload_bytes = ?config.max_upload_bytes,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
