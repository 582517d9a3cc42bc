use crate::constants::{
    DEFAULT_MAX_AGE, DEFAULT_PNG_OPTIM_LEVEL, DEFAULT_UPLOAD_ACL, MARKER_FILE, PROCESSED_LOG_FILE,
    UNLIMITED_FILE_SIZE,
};
use crate::error::{Result, SqueezeError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Knobs forwarded to the codec passes.
#[derive(Debug, Clone)]
pub struct CodecTuning {
    pub png_optim_level: u8,
    pub jpg_progressive: bool,
    pub gif_interlaced: bool,
}

impl Default for CodecTuning {
    fn default() -> Self {
        Self {
            png_optim_level: DEFAULT_PNG_OPTIM_LEVEL,
            jpg_progressive: false,
            gif_interlaced: false,
        }
    }
}

/// Run configuration, built once at startup and passed by reference into
/// every component. No component reads the process environment directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_bucket: String,
    /// Destination bucket; `None` writes back to the bucket read from.
    pub upload_bucket: Option<String>,
    pub upload_acl: String,
    /// Restricts the batch listing to keys under this prefix.
    pub prefix: Option<String>,
    /// Objects whose base filename starts with this are skipped.
    pub exclude_prefix: Option<String>,
    /// Maximum eligible size in bytes; -1 means unlimited.
    pub max_file_size: i64,
    /// Cache-Control max-age seconds applied to written objects.
    pub max_age: u64,
    pub codec: CodecTuning,
    pub marker_file: PathBuf,
    pub processed_log: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment. A `.env` file
    /// is loaded first when `SOURCE_BUCKET` is absent, matching the usual
    /// local-development setup.
    pub fn from_env() -> Result<Self> {
        if std::env::var_os("SOURCE_BUCKET").is_none() {
            let _ = dotenvy::dotenv();
        }
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Builds the configuration from an explicit key/value map.
    ///
    /// Unset or empty values fall back to defaults; unparseable numeric
    /// values are treated as unset (`MAX_FILE_SIZE=abc` means unlimited).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let get_bool = |name: &str| get(name).is_some_and(|value| value == "true");

        let source_bucket = get("SOURCE_BUCKET")
            .ok_or_else(|| SqueezeError::Config("SOURCE_BUCKET is not set".to_string()))?;

        Ok(Self {
            source_bucket,
            upload_bucket: get("UPLOAD_BUCKET"),
            upload_acl: get("UPLOAD_ACL").unwrap_or_else(|| DEFAULT_UPLOAD_ACL.to_string()),
            prefix: get("PREFIX"),
            exclude_prefix: get("EXCLUDE_PREFIX"),
            max_file_size: get("MAX_FILE_SIZE")
                .and_then(|value| value.parse().ok())
                .unwrap_or(UNLIMITED_FILE_SIZE),
            max_age: get("MAX_AGE")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_AGE),
            codec: CodecTuning {
                png_optim_level: get("PNG_OPTIM_LEVEL")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(DEFAULT_PNG_OPTIM_LEVEL),
                jpg_progressive: get_bool("JPG_OPTIM_PROGRESSIVE"),
                gif_interlaced: get_bool("GIF_OPTIM_INTERLACED"),
            },
            marker_file: PathBuf::from(MARKER_FILE),
            processed_log: PathBuf::from(PROCESSED_LOG_FILE),
        })
    }
}
