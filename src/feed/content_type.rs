use super::FeedError;

/// Media types a feed submission may be sent as.
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["application/atom+xml", "application/rss+xml"];

/// Reject submissions whose media type is not Atom or RSS.
///
/// Parameters such as `; charset=utf-8` are ignored and the comparison is
/// case-insensitive.
pub fn ensure_content_type(content_type: &str) -> Result<(), FeedError> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ALLOWED_CONTENT_TYPES.contains(&media_type.as_str()) {
        Ok(())
    } else {
        Err(FeedError::UnsupportedContentType(content_type.to_string()))
    }
}
