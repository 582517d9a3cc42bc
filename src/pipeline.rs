use crate::config::Config;
use crate::constants::{
    OPTIMIZED_METADATA_KEY, OPTIMIZED_METADATA_VALUE, SUPPORTED_IMAGE_EXTENSIONS,
    UNLIMITED_FILE_SIZE,
};
use crate::error::{Result, SqueezeError};
use crate::optimizer::optimize_image;
use crate::storage::{ObjectStore, PutRequest};
use crate::{error, info};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;

/// Why an object was left untouched. Skips are successes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExcludedPrefix,
    AlreadyOptimized,
    NotAnImage,
    Empty,
    TooLarge,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::ExcludedPrefix => "filename matches the excluded prefix",
            SkipReason::AlreadyOptimized => "already optimized",
            SkipReason::NotAnImage => "not an image",
            SkipReason::Empty => "empty object",
            SkipReason::TooLarge => "larger than the configured threshold",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Optimized { original: usize, optimized: usize },
    Skipped(SkipReason),
}

/// Undoes the transport encoding applied to keys in storage notifications:
/// `+` means space, the rest is percent-encoded.
pub fn normalize_key(raw: &str) -> Result<String> {
    percent_decode_str(&raw.replace('+', "%20"))
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SqueezeError::InvalidKey(format!("{raw}: {e}")))
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Substring after the final `.`, if the key has one at all.
fn extension(key: &str) -> Option<&str> {
    key.rsplit_once('.').map(|(_, ext)| ext)
}

/// Decides whether an object should be optimized. Checks run in a fixed
/// order and the first failing one wins.
pub fn eligibility(
    key: &str,
    metadata: &HashMap<String, String>,
    content_length: Option<i64>,
    config: &Config,
) -> Option<SkipReason> {
    if let Some(excluded) = &config.exclude_prefix {
        if basename(key).starts_with(excluded.as_str()) {
            return Some(SkipReason::ExcludedPrefix);
        }
    }

    if metadata
        .get(OPTIMIZED_METADATA_KEY)
        .is_some_and(|value| !value.is_empty())
    {
        return Some(SkipReason::AlreadyOptimized);
    }

    match extension(key) {
        None => {
            error!("Unable to infer image type for key {key}");
            return Some(SkipReason::NotAnImage);
        }
        Some(ext) => {
            let ext = ext.to_lowercase();
            if !SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Some(SkipReason::NotAnImage);
            }
        }
    }

    let length = content_length.unwrap_or(0);
    if length <= 0 {
        return Some(SkipReason::Empty);
    }
    if config.max_file_size != UNLIMITED_FILE_SIZE && length > config.max_file_size {
        return Some(SkipReason::TooLarge);
    }

    None
}

/// Runs one object through fetch → filter → optimize → store.
///
/// The write goes to the configured upload bucket (falling back to the
/// bucket read from), carries the fetched content-type, the configured
/// cache-control and ACL, and the metadata map with the optimized marker
/// set. The source object is never deleted.
pub async fn process_one(
    store: &dyn ObjectStore,
    config: &Config,
    bucket: &str,
    key: &str,
) -> Result<Outcome> {
    let key = normalize_key(key)?;
    info!("Processing {key}");

    let head = store.head_object(bucket, &key).await?;
    if let Some(reason) = eligibility(&key, &head.metadata, head.content_length, config) {
        info!("Skipping {key}: {reason}");
        return Ok(Outcome::Skipped(reason));
    }

    let object = store.get_object(bucket, &key).await?;
    let original = object.body.len();

    let optimized = optimize_image(&object.body, &config.codec)?;
    info!(
        "Optimized! Final file size from {original} to {} - {key}",
        optimized.len()
    );

    let mut metadata = head.metadata;
    metadata.insert(
        OPTIMIZED_METADATA_KEY.to_string(),
        OPTIMIZED_METADATA_VALUE.to_string(),
    );

    let destination = config.upload_bucket.as_deref().unwrap_or(bucket);
    let optimized_len = optimized.len();
    store
        .put_object(PutRequest {
            bucket: destination.to_string(),
            key: key.clone(),
            body: optimized,
            content_type: object.content_type,
            cache_control: format!("max-age={}", config.max_age),
            acl: config.upload_acl.clone(),
            metadata,
        })
        .await?;
    info!("Uploaded {key}");

    Ok(Outcome::Optimized {
        original,
        optimized: optimized_len,
    })
}
