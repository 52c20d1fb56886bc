//! Codec negotiation
//!
//! Recording containers are picked from an ordered preference list against
//! what the backend reports it can encode.

/// Preferred containers, best first
pub const CODEC_PREFERENCES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
    "video/mp4",
];

/// Container assumed when an encoder does not name the one it used
pub const PLATFORM_DEFAULT_CODEC: &str = "video/webm";

/// Owned copy of [`CODEC_PREFERENCES`], for configuration defaults
pub fn default_preferences() -> Vec<String> {
    CODEC_PREFERENCES.iter().map(|c| c.to_string()).collect()
}

/// Pick the first supported codec from `preferences`.
///
/// Returns None when nothing is supported; the caller then lets the backend
/// use its platform default.
pub fn select_codec<'a, F>(preferences: &'a [String], supports: F) -> Option<&'a str>
where
    F: Fn(&str) -> bool,
{
    preferences
        .iter()
        .map(String::as_str)
        .find(|codec| supports(codec))
}

/// File extension for a container string ("video/webm;codecs=vp9" -> "webm")
pub fn file_extension(mime_type: &str) -> &'static str {
    let container = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match container.as_str() {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "bin",
    }
}
