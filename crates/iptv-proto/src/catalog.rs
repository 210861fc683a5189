//! Channel catalog: M3U playlist parsing, group filtering and playlist fetch.
//!
//! The parser is deliberately tolerant.  Anything it does not understand is
//! skipped, and a `#EXTINF` line that never receives a URL simply produces no
//! record.  It never returns an error.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::locator::has_playable_scheme;
use crate::protocol::ChannelRecord;

const EXTINF_MARKER: &str = "#EXTINF";

fn logo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"tvg-logo="(.*?)""#).expect("static regex"))
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"group-title="(.*?)""#).expect("static regex"))
}

/// Metadata collected from one `#EXTINF` line, waiting for its URL line.
#[derive(Debug)]
struct PendingEntry {
    name: Option<String>,
    logo: Option<String>,
    group: Option<String>,
}

impl PendingEntry {
    fn from_extinf(line: &str) -> Self {
        let name = line
            .rfind(',')
            .map(|idx| line[idx + 1..].trim().to_string());
        let logo = logo_re().captures(line).map(|c| c[1].to_string());
        let group = group_re().captures(line).map(|c| c[1].to_string());
        Self { name, logo, group }
    }

    fn into_record(self, url: &str) -> ChannelRecord {
        ChannelRecord {
            name: self.name.unwrap_or_else(|| url.to_string()),
            url: url.to_string(),
            logo: self.logo,
            group: self.group,
        }
    }
}

/// Parse M3U text into channel records, in source order.
pub fn parse_m3u(content: &str) -> Vec<ChannelRecord> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF_MARKER) {
            // A second #EXTINF before any URL replaces the first.
            pending = Some(PendingEntry::from_extinf(line));
            continue;
        }

        if has_playable_scheme(line) {
            match pending.take() {
                Some(entry) => channels.push(entry.into_record(line)),
                None => debug!("catalog: url without #EXTINF skipped: {}", line),
            }
        }
    }

    channels
}

/// Ordered, immutable list of channels with the lookups the screens need.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    channels: Vec<ChannelRecord>,
}

impl Catalog {
    pub fn new(channels: Vec<ChannelRecord>) -> Self {
        Self { channels }
    }

    pub fn parse(content: &str) -> Self {
        Self::new(parse_m3u(content))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&ChannelRecord> {
        self.channels.get(index)
    }

    /// Index of the channel with this url.  Urls are the channel identity.
    pub fn position(&self, url: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.url == url)
    }

    /// Distinct group labels in order of first appearance.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for group in self.channels.iter().filter_map(|c| c.group.as_ref()) {
            if !groups.iter().any(|g| g == group) {
                groups.push(group.clone());
            }
        }
        groups
    }

    /// Channels whose group label equals `group`, in playlist order.
    pub fn in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ChannelRecord> + 'a {
        self.channels
            .iter()
            .filter(move |c| c.group.as_deref() == Some(group))
    }
}

// ── loaders ───────────────────────────────────────────────────────────────────

pub fn load_playlist_file(path: &Path) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    Ok(Catalog::parse(&content))
}

/// HTTP GET the playlist and parse it.  Non-2xx responses are errors.
pub async fn fetch_playlist(url: &str, timeout: Duration) -> anyhow::Result<Catalog> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }
    let text = response.text().await?;
    let catalog = Catalog::parse(&text);
    info!("catalog: fetched {} channels from {}", catalog.len(), url);
    Ok(catalog)
}

/// Load a playlist from either an `http(s)://` URL or a local file path.
pub async fn load_playlist(source: &str, timeout: Duration) -> anyhow::Result<Catalog> {
    if has_playable_scheme(source) {
        fetch_playlist(source, timeout).await
    } else {
        let catalog = load_playlist_file(Path::new(source))?;
        info!("catalog: loaded {} channels from {}", catalog.len(), source);
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="c7" tvg-logo="http://10.0.0.1/logos/c7.png" group-title="A",Canal 7
http://10.0.0.1:8081/live/c7.m3u8
#EXTINF:-1 tvg-logo="http://10.0.0.1/logos/tn.png" group-title="A",TN Noticias
#EXTVLCOPT:network-caching=1000
http://10.0.0.1:8081/live/tn.flv
#EXTINF:-1 group-title="B",Deportes
https://cdn.example.com/dep/index.m3u8
"#;

    #[test]
    fn test_parse_extracts_fields_in_order() {
        let channels = parse_m3u(SAMPLE);
        assert_eq!(channels.len(), 3);

        assert_eq!(channels[0].name, "Canal 7");
        assert_eq!(channels[0].url, "http://10.0.0.1:8081/live/c7.m3u8");
        assert_eq!(
            channels[0].logo.as_deref(),
            Some("http://10.0.0.1/logos/c7.png")
        );
        assert_eq!(channels[0].group.as_deref(), Some("A"));

        assert_eq!(channels[1].name, "TN Noticias");
        assert_eq!(channels[1].url, "http://10.0.0.1:8081/live/tn.flv");

        assert_eq!(channels[2].name, "Deportes");
        assert_eq!(channels[2].logo, None);
        assert_eq!(channels[2].group.as_deref(), Some("B"));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_m3u("").is_empty());
        assert!(parse_m3u("#EXTM3U\n\n").is_empty());
    }

    #[test]
    fn test_metadata_without_url_is_dropped() {
        let text = "#EXTM3U\n#EXTINF:-1,Orphan\n#EXTINF:-1,Real\nhttp://h/real.m3u8\n#EXTINF:-1,Tail\n";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Real");
    }

    #[test]
    fn test_name_is_after_last_comma_and_missing_attrs_absent() {
        let channels = parse_m3u("#EXTINF:-1 tvg-name=\"x\",Uno, Dos ,  Tres  \nhttp://h/a\n");
        assert_eq!(channels[0].name, "Tres");
        assert_eq!(channels[0].logo, None);
        assert_eq!(channels[0].group, None);
    }

    #[test]
    fn test_non_http_lines_and_orphan_urls_ignored() {
        let text = "#EXTINF:-1,Cam\nrtsp://192.168.1.2/stream\nhttp://h/cam.m3u8\nhttp://h/orphan.m3u8\n";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].url, "http://h/cam.m3u8");
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "#EXTM3U\r\n#EXTINF:-1 group-title=\"A\",Uno\r\nhttp://h/1.m3u8\r\n";
        let channels = parse_m3u(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Uno");
        assert_eq!(channels[0].url, "http://h/1.m3u8");
    }

    #[test]
    fn test_group_filter_keeps_order() {
        let catalog = Catalog::parse(SAMPLE);
        let a: Vec<&str> = catalog.in_group("A").map(|c| c.name.as_str()).collect();
        assert_eq!(a, vec!["Canal 7", "TN Noticias"]);
        assert_eq!(catalog.groups(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(catalog.in_group("Z").count(), 0);
    }

    #[test]
    fn test_position_by_url() {
        let catalog = Catalog::parse(SAMPLE);
        assert_eq!(
            catalog.position("https://cdn.example.com/dep/index.m3u8"),
            Some(2)
        );
        assert_eq!(catalog.position("http://nope"), None);
    }

    #[test]
    fn test_load_playlist_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tda.m3u");
        std::fs::write(&path, SAMPLE).unwrap();
        let catalog = load_playlist_file(&path).unwrap();
        assert_eq!(catalog.len(), 3);
    }

    /// One-shot HTTP server answering every request with `status` and `body`.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/tda.m3u", addr)
    }

    #[tokio::test]
    async fn test_fetch_playlist_over_http() {
        let url = serve_once("200 OK", SAMPLE).await;
        let catalog = load_playlist(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.groups(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_fetch_playlist_rejects_error_status() {
        let url = serve_once("404 Not Found", "").await;
        let err = fetch_playlist(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("404"), "{}", err);
    }
}
