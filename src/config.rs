use std::{env, path::PathBuf};

use thiserror::Error;

pub const DEFAULT_SECRET_KEY: &str = "dev-secret-key-change-in-production";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// How decoded pixel values are scaled before they reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelScaling {
    /// Keep 0..=255 values untouched.
    Raw,
    /// Divide every channel by 255.
    UnitRange,
}

/// Where the model artifact lives and how to reach its tensors.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub url: Option<String>,
    pub download_token: Option<String>,
    /// Input operation of a frozen graph. SavedModels use their serving signature.
    pub input_op: String,
    pub output_op: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub secret_key: String,
    pub upload_dir: PathBuf,
    pub model: ModelConfig,
    pub img_width: u32,
    pub img_height: u32,
    pub batch_size: usize,
    pub pixel_scaling: PixelScaling,
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub error_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: true,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            upload_dir: PathBuf::from("static/image"),
            model: ModelConfig {
                path: PathBuf::from("SkinCancerClassificationModelFinal"),
                url: None,
                download_token: None,
                input_op: "x".to_string(),
                output_op: "Identity".to_string(),
            },
            img_width: 28,
            img_height: 28,
            batch_size: 10,
            pixel_scaling: PixelScaling::Raw,
            host: "0.0.0.0".to_string(),
            port: 2500,
            body_limit_bytes: 5 * 1024 * 1024,
            error_log: PathBuf::from("error.log"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(debug) = lookup("DEBUG") {
            config.debug = parse_flag(&debug);
        }
        if let Some(secret_key) = lookup("SECRET_KEY") {
            config.secret_key = secret_key;
        }
        if let Some(dir) = lookup("IMAGE_UPLOADS") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            config.model.path = PathBuf::from(path);
        }
        config.model.url = lookup("MODEL_URL").filter(|url| !url.is_empty());
        config.model.download_token = lookup("MODEL_DOWNLOAD_TOKEN").filter(|t| !t.is_empty());
        if let Some(op) = lookup("MODEL_INPUT_OP") {
            config.model.input_op = op;
        }
        if let Some(op) = lookup("MODEL_OUTPUT_OP") {
            config.model.output_op = op;
        }
        if let Some(width) = lookup("IMG_WIDTH") {
            config.img_width = parse_positive("IMG_WIDTH", width)?;
        }
        if let Some(height) = lookup("IMG_HEIGHT") {
            config.img_height = parse_positive("IMG_HEIGHT", height)?;
        }
        if let Some(batch_size) = lookup("BATCH_SIZE") {
            config.batch_size = parse_positive("BATCH_SIZE", batch_size)?;
        }
        if let Some(scaling) = lookup("PIXEL_SCALING") {
            config.pixel_scaling = match scaling.to_ascii_lowercase().as_str() {
                "raw" => PixelScaling::Raw,
                "unit" => PixelScaling::UnitRange,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "PIXEL_SCALING",
                        value: scaling,
                        reason: "must be `raw` or `unit`",
                    })
                }
            };
        }
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT",
                value: port,
                reason: "must be a valid number between 0 and 65535",
            })?;
        }
        if let Some(mb) = lookup("BODY_LIMIT_MB") {
            let mb: usize = parse_positive("BODY_LIMIT_MB", mb)?;
            config.body_limit_bytes = mb * 1024 * 1024;
        }
        if let Some(path) = lookup("ERROR_LOG") {
            config.error_log = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Shape every prepared batch of one image must have: (1, height, width, 3).
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.img_height as usize, self.img_width as usize, 3]
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

fn parse_positive<T>(field: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed != T::default() => Ok(parsed),
        Ok(_) => Err(ConfigError::InvalidValue {
            field,
            value,
            reason: "must be greater than zero",
        }),
        Err(_) => Err(ConfigError::InvalidValue {
            field,
            value,
            reason: "must be a positive integer",
        }),
    }
}
