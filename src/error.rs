use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqueezeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("PNG quantization error: {0}")]
    PngQuantization(String),

    #[error("JPEG encoding error: {0}")]
    JpegEncoding(String),

    #[error("Invalid object key {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification parse error: {0}")]
    EventParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SqueezeError>;
