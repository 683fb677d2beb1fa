use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const ALLOWED_PICTURE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

/// File extension (with the leading dot) for a MIME type, empty when unknown.
pub fn extension_for(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match essence.as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        other => mime_guess::get_mime_extensions_str(other).and_then(|exts| exts.first().copied()),
    };
    ext.map(|e| format!(".{e}")).unwrap_or_default()
}

/// `<UTC timestamp>-<first 8 hex chars of the SHA-256>` plus the extension.
/// The short hash keeps keys free of characters that upset other systems.
pub fn object_key(now: DateTime<Utc>, content_hash: &str, content_type: &str) -> String {
    let short = &content_hash[..content_hash.len().min(8)];
    format!(
        "{}-{}{}",
        now.format("%Y%m%d%H%M%S"),
        short,
        extension_for(content_type)
    )
}
