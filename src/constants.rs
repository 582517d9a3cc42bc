pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "gif", "png", "svg"];

/// Reserved metadata attribute marking an object as already optimized.
pub const OPTIMIZED_METADATA_KEY: &str = "optimized";
pub const OPTIMIZED_METADATA_VALUE: &str = "y";

// Persisted batch state. The marker holds the resume cursor; the log is an
// append-only audit trail and is never read back.
pub const MARKER_FILE: &str = ".marker";
pub const PROCESSED_LOG_FILE: &str = "processed.log";

pub const LIST_PAGE_SIZE: i32 = 1000;

pub const DEFAULT_UPLOAD_ACL: &str = "public-read";
pub const DEFAULT_MAX_AGE: u64 = 600;
pub const UNLIMITED_FILE_SIZE: i64 = -1;

pub const DEFAULT_PNG_OPTIM_LEVEL: u8 = 7;
/// oxipng presets stop at 6; the configured level is clamped to this.
pub const MAX_OXIPNG_PRESET: u8 = 6;

pub const PNG_QUANT_QUALITY_MIN: u8 = 65;
pub const PNG_QUANT_QUALITY_MAX: u8 = 100;
pub const PNG_QUANT_DITHERING: f32 = 1.0;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// 1 (best compression) to 30 (fastest) for GIF re-encoding.
pub const GIF_ENCODE_SPEED: i32 = 10;
