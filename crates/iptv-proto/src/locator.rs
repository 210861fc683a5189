use serde::{Deserialize, Serialize};

/// Which playback pipeline a locator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pipeline {
    /// Segmented adaptive streaming (HLS).  The default.
    Adaptive,
    /// Single progressive container (FLV).
    Progressive,
}

impl Pipeline {
    pub fn for_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains(".m3u8") {
            Pipeline::Adaptive
        } else if lower.ends_with(".flv") {
            Pipeline::Progressive
        } else {
            Pipeline::Adaptive
        }
    }
}

/// True for `http://` and `https://` urls (scheme compared case-insensitively).
pub fn has_playable_scheme(s: &str) -> bool {
    let prefix: String = s.chars().take(8).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("http://") || prefix.starts_with("https://")
}

/// A validated, playable resource locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLocator {
    url: String,
    pipeline: Pipeline,
}

impl MediaLocator {
    /// Validate `url`.  Returns `None` when it is empty or not http(s).
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() || !has_playable_scheme(url) {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            pipeline: Pipeline::for_url(url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }
}

impl std::fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_selection() {
        assert_eq!(Pipeline::for_url("http://h/live/c7.m3u8"), Pipeline::Adaptive);
        assert_eq!(
            Pipeline::for_url("http://h/live/c7.m3u8?token=1"),
            Pipeline::Adaptive
        );
        assert_eq!(Pipeline::for_url("http://h/live/tn.FLV"), Pipeline::Progressive);
        assert_eq!(Pipeline::for_url("http://h/live/stream"), Pipeline::Adaptive);
    }

    #[test]
    fn test_locator_validation() {
        assert!(MediaLocator::parse("ftp://x").is_none());
        assert!(MediaLocator::parse("").is_none());
        assert!(MediaLocator::parse("   ").is_none());
        assert!(MediaLocator::parse("http").is_none());
        let loc = MediaLocator::parse("HTTPS://h/a.flv").unwrap();
        assert_eq!(loc.pipeline(), Pipeline::Progressive);
        assert_eq!(loc.url(), "HTTPS://h/a.flv");
    }
}
