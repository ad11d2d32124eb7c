use url::Url;

/// Derive a destination filename from a download URL.
///
/// Uses the final path segment, sanitized for the filesystem. Returns
/// None when the URL has no usable segment (e.g. a bare host), in
/// which case the queue falls back to a generated name.
pub fn filename_for_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())?
        .trim();

    if segment.is_empty() {
        return None;
    }

    let name = sanitize_filename::sanitize(segment);
    if name.is_empty() { None } else { Some(name) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_last_path_segment() {
        let url = Url::parse("https://example.com/podcast/episode-1.mp3").unwrap();
        assert_eq!(filename_for_url(&url), Some("episode-1.mp3".to_string()));
    }

    #[test]
    fn query_string_is_not_part_of_the_name() {
        let url = Url::parse("https://example.com/ep.mp3?token=abc&x=1").unwrap();
        assert_eq!(filename_for_url(&url), Some("ep.mp3".to_string()));
    }

    #[test]
    fn bare_host_yields_none() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_for_url(&url), None);
    }

    #[test]
    fn trailing_slash_yields_none() {
        let url = Url::parse("https://example.com/podcast/").unwrap();
        assert_eq!(filename_for_url(&url), None);
    }
}
