//! Object key derivation shared by the gateway and the pipeline workers.
//!
//! A raw key `{listing}/raw/{mediaType}/{file}` maps onto
//! `{listing}/processed/{mediaType}/{resolution}/{file}`, so a signed download
//! URL for `(asset, resolution)` points at the same object a worker wrote.

use std::collections::HashSet;
use std::path::Path;

use propmedia_core::models::{metadata_keys, MediaAsset, MediaAssetType};

use crate::traits::{StorageError, StorageResult};

const MAX_REFERENCE_LEN: usize = 48;
const MAX_FILENAME_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    Thumbnail,
    Small,
    Medium,
    Large,
    Original,
}

impl Resolution {
    /// Image derivatives, smallest first.
    pub const DERIVATIVES: [Resolution; 4] = [
        Resolution::Thumbnail,
        Resolution::Small,
        Resolution::Medium,
        Resolution::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Thumbnail => "thumbnail",
            Resolution::Small => "small",
            Resolution::Medium => "medium",
            Resolution::Large => "large",
            Resolution::Original => "original",
        }
    }

    /// Target width in pixels; `None` for the original.
    pub fn width(&self) -> Option<u32> {
        match self {
            Resolution::Thumbnail => Some(200),
            Resolution::Small => Some(400),
            Resolution::Medium => Some(800),
            Resolution::Large => Some(1200),
            Resolution::Original => None,
        }
    }

    /// Higher is better; used to pick the primary processed key.
    pub fn rank(&self) -> u8 {
        match self {
            Resolution::Thumbnail => 0,
            Resolution::Small => 1,
            Resolution::Medium => 2,
            Resolution::Large => 3,
            Resolution::Original => 4,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "thumbnail" => Some(Resolution::Thumbnail),
            "small" => Some(Resolution::Small),
            "medium" => Some(Resolution::Medium),
            "large" => Some(Resolution::Large),
            "original" => Some(Resolution::Original),
            _ => None,
        }
    }

    /// Resolution segment of a processed key (`.../processed/photo/vertical/{res}/file`).
    pub fn from_key(key: &str) -> Option<Self> {
        let (_, rest) = key.split_once("processed/")?;
        rest.split('/').nth(2).and_then(Self::parse)
    }
}

/// Replaces every run of characters rejected by `allowed` with a single `-`.
fn replace_runs(value: &str, allowed: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if allowed(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}

pub fn sanitize_segment(value: &str) -> String {
    let sanitized = replace_runs(value.trim(), |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    });
    let mut sanitized = sanitized.trim_matches(|c| c == '-' || c == '_').to_string();
    sanitized.truncate(MAX_REFERENCE_LEN);
    sanitized
}

pub fn default_extension(content_type: &str) -> &'static str {
    match content_type.trim().to_lowercase().as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/heic" => ".heic",
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "application/pdf" => ".pdf",
        _ => ".bin",
    }
}

/// Filesystem-safe filename with an extension, at most 96 characters.
pub fn sanitize_filename(name: &str, content_type: &str) -> String {
    let trimmed = name.trim();
    let mut sanitized = replace_runs(trimmed, |c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
    })
    .trim_matches(|c| c == '-' || c == '.')
    .to_string();
    if sanitized.is_empty() {
        sanitized = "asset".to_string();
    }

    let ext = Path::new(trimmed)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| default_extension(content_type).to_string());
    if sanitized.to_lowercase().ends_with(&ext.to_lowercase()) {
        sanitized.truncate(sanitized.len() - ext.len());
    }

    // The stem gives way so the extension survives truncation.
    sanitized.truncate(MAX_FILENAME_LEN.saturating_sub(ext.len()));
    let mut stem = sanitized.trim_end_matches(|c| c == '-' || c == '.').to_string();
    if stem.is_empty() {
        stem = "asset".to_string();
    }
    stem.push_str(&ext);
    stem
}

fn upload_reference(asset: &MediaAsset) -> String {
    let explicit = asset
        .metadata_value(metadata_keys::CLIENT_ID)
        .or_else(|| asset.metadata_value("clientId"));
    let reference = match explicit {
        Some(client_id) => client_id.to_string(),
        None if asset.sequence > 0 => {
            let prefix = asset.asset_type.orientation().unwrap_or("seq");
            format!("{}-{:02}", prefix, asset.sequence)
        }
        None => String::new(),
    };
    let reference = sanitize_segment(&reference);
    if reference.is_empty() {
        "asset".to_string()
    } else {
        reference
    }
}

fn build_object_key(listing_identity_id: i64, stage: &str, asset: &MediaAsset) -> String {
    let filename = sanitize_filename(
        asset
            .metadata_value(metadata_keys::FILENAME)
            .unwrap_or("file"),
        asset
            .metadata_value(metadata_keys::CONTENT_TYPE)
            .unwrap_or_default(),
    );
    format!(
        "{}/{}/{}/{}-{}",
        listing_identity_id,
        stage,
        asset.asset_type.path_segment(),
        upload_reference(asset),
        filename
    )
}

/// Deterministic raw key for an asset. An existing raw key is reused.
pub fn raw_object_key(listing_identity_id: i64, asset: &MediaAsset) -> String {
    match asset.raw_key() {
        Some(existing) => existing.to_string(),
        None => build_object_key(listing_identity_id, "raw", asset),
    }
}

fn last_segment(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|s| !s.is_empty())
}

fn asset_filename(asset: &MediaAsset) -> String {
    if let Some(file) = asset.processed_key().and_then(last_segment) {
        return file.to_string();
    }
    if let Some(file) = asset.raw_key().and_then(last_segment) {
        return file.to_string();
    }
    if let Some(name) = asset.metadata_value(metadata_keys::FILENAME) {
        return sanitize_filename(
            name,
            asset
                .metadata_value(metadata_keys::CONTENT_TYPE)
                .unwrap_or_default(),
        );
    }
    format!("asset-{}-{}.bin", asset.listing_identity_id, asset.sequence)
}

/// Key served for `(asset, resolution)` download requests.
pub fn processed_download_key(
    listing_identity_id: i64,
    asset: &MediaAsset,
    resolution: Resolution,
) -> String {
    if asset.asset_type == MediaAssetType::Zip {
        return match asset.processed_key() {
            Some(key) => key.to_string(),
            None => build_object_key(listing_identity_id, "processed", asset),
        };
    }

    let stage = if asset.asset_type == MediaAssetType::Thumbnail {
        "thumb"
    } else {
        "processed"
    };
    format!(
        "{}/{}/{}/{}/{}",
        listing_identity_id,
        stage,
        asset.asset_type.path_segment(),
        resolution.as_str(),
        asset_filename(asset)
    )
}

/// Key for an original copied verbatim into the processed tree (project media).
pub fn processed_original_key(listing_identity_id: i64, asset: &MediaAsset) -> String {
    processed_download_key(listing_identity_id, asset, Resolution::Original)
}

/// Removes every `YYYY-MM-DD/` segment.
pub fn strip_date_segments(value: &str) -> String {
    fn is_date_at(bytes: &[u8], i: usize) -> bool {
        const PATTERN: &[u8] = b"dddd-dd-dd/";
        bytes.len() >= i + PATTERN.len()
            && PATTERN.iter().enumerate().all(|(j, p)| match p {
                b'd' => bytes[i + j].is_ascii_digit(),
                other => bytes[i + j] == *other,
            })
    }

    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < bytes.len() {
        if is_date_at(bytes, i) {
            i += 11;
            continue;
        }
        let ch = value[i..].chars().next().unwrap_or_default();
        out.push(ch);
        i += ch.len_utf8().max(1);
    }
    out
}

/// Derivative key for a raw key: `{prefix}processed/{dir}/{resolution}/{file}`.
///
/// Applying it to a key that is already in the processed layout only swaps the
/// resolution segment.
pub fn derivative_key(source_key: &str, resolution: &str) -> StorageResult<String> {
    if let Some((prefix, rest)) = source_key.split_once("processed/") {
        if prefix.is_empty() || prefix.ends_with('/') {
            let mut parts: Vec<&str> = rest.split('/').collect();
            if parts.len() >= 3 {
                let file = parts.pop().unwrap_or_default();
                parts.pop();
                let key = format!("{}processed/{}/{}/{}", prefix, parts.join("/"), resolution, file);
                return Ok(key.replace("//", "/"));
            }
        }
    }

    let (prefix, suffix) = source_key.split_once("raw/").ok_or_else(|| {
        StorageError::InvalidKey(format!(
            "{} must contain a 'raw/' segment",
            source_key
        ))
    })?;
    let clean = strip_date_segments(suffix);
    let (dir, file) = match clean.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", clean.as_str()),
    };
    let key = format!("{}processed/{}/{}/{}", prefix, dir, resolution, file);
    Ok(key.replace("//", "/"))
}

/// Archive entry name: the key without `{listing}/raw/` and date segments.
pub fn archive_entry_name(key: &str) -> String {
    let relative = match key.split_once("raw/") {
        Some((_, rest)) => rest,
        None => key,
    };
    strip_date_segments(relative)
        .trim_start_matches('/')
        .to_string()
}

pub fn zip_object_key(listing_identity_id: i64, batch_id: i64, unix_seconds: i64) -> String {
    format!(
        "{}/zip/complete_{}_{}.zip",
        listing_identity_id, batch_id, unix_seconds
    )
}

/// Trimmed, non-empty, first occurrence kept.
pub fn dedupe_keys<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter_map(|k| {
            let trimmed = k.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_string()) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
