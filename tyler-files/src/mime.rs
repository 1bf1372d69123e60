//! MIME type resolution for stored files.

/// Resolve a MIME type: the caller's hint wins, then the filename
/// extension, then a content sniff.
#[must_use]
pub fn detect_mime(content: &[u8], filename: &str, hint: Option<&str>) -> String {
    if let Some(hint) = hint
        && !hint.is_empty()
    {
        return hint.to_string();
    }
    if let Some(guessed) = mime_guess::from_path(filename).first_raw() {
        return guessed.to_string();
    }
    sniff_mime(content).to_string()
}

/// Sniff a MIME type from magic numbers, falling back to `text/plain`
/// for valid UTF-8 and `application/octet-stream` otherwise.
#[must_use]
pub fn sniff_mime(content: &[u8]) -> &'static str {
    if content.starts_with(b"%PDF") {
        return "application/pdf";
    }
    if content.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if content.starts_with(b"\xFF\xD8\xFF") {
        return "image/jpeg";
    }
    if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if content.len() >= 12 && &content[0..4] == b"RIFF" && &content[8..12] == b"WEBP" {
        return "image/webp";
    }
    if content.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    if content.starts_with(b"\x1f\x8b") {
        return "application/gzip";
    }
    if content.starts_with(b"ID3") || content.starts_with(b"\xFF\xFB") {
        return "audio/mpeg";
    }
    if content.starts_with(b"OggS") {
        return "audio/ogg";
    }
    if content.starts_with(b"fLaC") {
        return "audio/flac";
    }
    if std::str::from_utf8(content).is_ok() {
        return "text/plain";
    }
    "application/octet-stream"
}
