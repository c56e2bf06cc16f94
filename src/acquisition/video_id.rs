// Source URL parsing and video ID derivation

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::errors::AcquisitionError;

lazy_static! {
    static ref VIDEO_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{6,64}$").unwrap();
}

/// Parse and sanity-check a source URL (http/https with a host)
pub fn parse_source_url(raw: &str) -> Result<Url, AcquisitionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AcquisitionError::InvalidUrl {
            url: raw.to_string(),
            reason: "URL is empty".to_string(),
        });
    }

    let url = Url::parse(trimmed).map_err(|e| AcquisitionError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AcquisitionError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AcquisitionError::InvalidUrl {
            url: raw.to_string(),
            reason: "URL has no host".to_string(),
        });
    }

    Ok(url)
}

/// Best-effort video ID extraction.
///
/// Recognises `?v=<id>`, `youtu.be/<id>`, `/shorts/<id>`, `/embed/<id>`
/// and `/live/<id>`. Anything else yields `None`.
pub fn derive_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();

    let candidate = if host == "youtu.be" || host.ends_with(".youtu.be") {
        url.path_segments()?.find(|s| !s.is_empty()).map(str::to_string)
    } else if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
        Some(v.into_owned())
    } else {
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        loop {
            match segments.next() {
                Some("shorts") | Some("embed") | Some("live") | Some("v") => {
                    break segments.next().map(str::to_string)
                }
                Some(_) => continue,
                None => break None,
            }
        }
    };

    candidate.filter(|id| VIDEO_ID.is_match(id))
}

/// Parse `raw` and derive its video ID, ignoring parse failures
pub fn derive_from_str(raw: &str) -> Option<String> {
    parse_source_url(raw).ok().as_ref().and_then(derive_video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url() {
        assert_eq!(
            derive_from_str("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn short_host_url() {
        assert_eq!(
            derive_from_str("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn path_forms() {
        for url in [
            "https://www.youtube.com/shorts/abcDEF12345",
            "https://www.youtube.com/embed/abcDEF12345?autoplay=1",
            "https://youtube.com/live/abcDEF12345",
        ] {
            assert_eq!(derive_from_str(url).as_deref(), Some("abcDEF12345"), "{}", url);
        }
    }

    #[test]
    fn unrecognised_shapes_have_no_id() {
        assert_eq!(derive_from_str("https://example.com/podcast.mp3"), None);
        assert_eq!(derive_from_str("https://www.youtube.com/watch?list=PL123"), None);
        assert_eq!(derive_from_str("https://www.youtube.com/watch?v=<script>"), None);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(parse_source_url("").is_err());
        assert!(parse_source_url("not a url").is_err());
        assert!(parse_source_url("ftp://example.com/a.mp3").is_err());
        assert!(parse_source_url("file:///etc/passwd").is_err());

        let err = parse_source_url("ftp://example.com/a.mp3").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn accepts_any_http_host() {
        assert!(parse_source_url("  https://vimeo.com/12345  ").is_ok());
    }
}
