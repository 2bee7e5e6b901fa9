//! Discovering which model files to load and fetching their bytes.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// `http(s)` URL of a directory index, or a local directory.
    pub directory: String,
    /// File extensions treated as models, without the dot.
    pub extensions: Vec<String>,
    /// Used when the directory cannot be listed. Relative entries are
    /// resolved against `directory`.
    pub fallback: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            directory: "models".into(),
            extensions: vec!["glb".into()],
            fallback: vec!["cube.glb".into(), "sphere.glb".into(), "torus.glb".into()],
        }
    }
}

pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Parses a directory URL so that relative links resolve inside it.
pub fn directory_url(directory: &str) -> Result<Url> {
    let mut dir = directory.to_string();
    if !dir.ends_with('/') {
        dir.push('/');
    }
    Url::parse(&dir).with_context(|| format!("invalid directory URL {directory}"))
}

fn has_model_extension(path: &str, extensions: &[String]) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Raw `href` attribute values in document order.
fn hrefs(html: &str) -> Vec<&str> {
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let skip_ws = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    };

    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(found) = lower[cursor..].find("href") {
        let mut i = skip_ws(cursor + found + 4);
        cursor = i;
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i = skip_ws(i + 1);
        let (start, end) = match bytes.get(i) {
            Some(&quote @ (b'"' | b'\'')) => {
                let start = i + 1;
                match html[start..].find(quote as char) {
                    Some(len) => (start, start + len),
                    None => break,
                }
            }
            Some(_) => {
                let len = html[i..]
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(html.len() - i);
                (i, i + len)
            }
            None => break,
        };
        out.push(&html[start..end]);
        cursor = end;
    }
    out
}

/// Model links of an HTML directory index, resolved against `base` and
/// deduplicated in document order.
pub fn parse_directory_index(html: &str, base: &Url, extensions: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for href in hrefs(html) {
        let href = href.replace("&amp;", "&");
        let path = href.split(['?', '#']).next().unwrap_or_default();
        if !has_model_extension(path, extensions) {
            continue;
        }
        match base.join(&href) {
            Ok(url) => {
                let id = url.to_string();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Err(err) => debug!("ignoring link {href}: {err}"),
        }
    }
    ids
}

/// Lists the configured directory, over HTTP or on disk.
pub fn list_directory(config: &ModelsConfig, client: &Client) -> Result<Vec<String>> {
    if is_url(&config.directory) {
        let base = directory_url(&config.directory)?;
        let html = client
            .get(base.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("failed to fetch directory index {base}"))?;
        return Ok(parse_directory_index(&html, &base, &config.extensions));
    }

    let entries = std::fs::read_dir(&config.directory)
        .with_context(|| format!("failed to read directory {}", config.directory))?;
    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .map(|path| path.to_string_lossy().into_owned())
        .filter(|path| has_model_extension(path, &config.extensions))
        .collect();
    ids.sort();
    Ok(ids)
}

/// Resolves a fallback entry against the configured directory.
pub fn resolve_entry(directory: &str, entry: &str) -> String {
    if is_url(entry) || Path::new(entry).is_absolute() {
        return entry.to_string();
    }
    if is_url(directory) {
        return directory_url(directory)
            .and_then(|base| base.join(entry).map_err(Into::into))
            .map_or_else(|_| entry.to_string(), |url| url.to_string());
    }
    Path::new(directory).join(entry).to_string_lossy().into_owned()
}

pub fn fallback_ids(config: &ModelsConfig) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for entry in &config.fallback {
        let id = resolve_entry(&config.directory, entry);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// The directory listing, or the fallback list if listing fails or finds
/// nothing.
pub fn resolve_model_ids(config: &ModelsConfig, client: &Client) -> Vec<String> {
    match list_directory(config, client) {
        Ok(ids) if !ids.is_empty() => {
            info!("found {} models in {}", ids.len(), config.directory);
            ids
        }
        Ok(_) => {
            info!("no models listed in {}, using fallback list", config.directory);
            fallback_ids(config)
        }
        Err(err) => {
            info!("{err:#}; using fallback list");
            fallback_ids(config)
        }
    }
}

pub fn fetch_model_bytes(client: &Client, id: &str) -> Result<Vec<u8>> {
    if is_url(id) {
        let bytes = client
            .get(id)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .with_context(|| format!("failed to download {id}"))?;
        return Ok(bytes.to_vec());
    }
    std::fs::read(id).with_context(|| format!("failed to read {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    const INDEX: &str = r#"<html><body><h1>Index of /models</h1>
<a href="?C=N;O=D">Name</a>
<a href="../">Parent Directory</a>
<a href="star.glb">star.glb</a>
<a HREF='Heart.GLB'>Heart.GLB</a>
<a href="notes.txt">notes.txt</a>
<a href=moon.glb>moon.glb</a>
<a href="star.glb">star.glb (again)</a>
<a href="/other/comet.glb?v=2">comet</a>
</body></html>"#;

    fn glb() -> Vec<String> {
        vec!["glb".to_string()]
    }

    #[test]
    fn directory_index_keeps_model_links_only() {
        let base = directory_url("http://localhost:8000/models").unwrap();
        let ids = parse_directory_index(INDEX, &base, &glb());
        assert_eq!(
            ids,
            vec![
                "http://localhost:8000/models/star.glb",
                "http://localhost:8000/models/Heart.GLB",
                "http://localhost:8000/models/moon.glb",
                "http://localhost:8000/other/comet.glb?v=2",
            ]
        );
    }

    #[test]
    fn directory_index_without_models_is_empty() {
        let base = directory_url("http://localhost/models/").unwrap();
        assert!(parse_directory_index("<a href=\"a.obj\">a</a> href", &base, &glb()).is_empty());
    }

    #[test]
    fn fallback_entries_resolve_against_the_directory() {
        assert_eq!(
            resolve_entry("https://example.com/assets", "cube.glb"),
            "https://example.com/assets/cube.glb"
        );
        assert_eq!(
            resolve_entry("models", "cube.glb"),
            Path::new("models").join("cube.glb").to_string_lossy()
        );
        assert_eq!(
            resolve_entry("models", "https://cdn.example.com/a.glb"),
            "https://cdn.example.com/a.glb"
        );
    }

    #[test]
    fn unreadable_directory_uses_fallback() {
        let config = ModelsConfig {
            directory: "/definitely/not/a/real/dir".into(),
            fallback: vec!["a.glb".into(), "a.glb".into(), "b.glb".into()],
            ..ModelsConfig::default()
        };
        let client = Client::new();
        let ids = resolve_model_ids(&config, &client);
        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("a.glb"));
    }

    #[test]
    fn local_directory_lists_model_files_sorted() {
        let dir = std::env::temp_dir().join(format!("fallscape-listing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.glb", "a.GLB", "readme.md"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let config = ModelsConfig {
            directory: dir.to_string_lossy().into_owned(),
            ..ModelsConfig::default()
        };

        let ids = list_directory(&config, &Client::new()).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("a.GLB"));
        assert!(ids[1].ends_with("b.glb"));
    }

    /// Answers a single request on loopback with a canned response and
    /// returns the requested path.
    fn serve_once(status: &str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let status = status.to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            let request = String::from_utf8_lossy(&request).into_owned();
            request
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string()
        });
        (base, handle)
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn missing_http_index_uses_fallback() {
        let (base, server) = serve_once("404 Not Found", "not here");
        let config = ModelsConfig {
            directory: format!("{base}/models"),
            fallback: vec!["cube.glb".into(), "https://cdn.example.com/ring.glb".into()],
            ..ModelsConfig::default()
        };

        let ids = resolve_model_ids(&config, &local_client());
        assert_eq!(server.join().unwrap(), "/models/");
        assert_eq!(
            ids,
            vec![
                format!("{base}/models/cube.glb"),
                "https://cdn.example.com/ring.glb".to_string(),
            ]
        );
    }

    #[test]
    fn http_index_lists_model_links() {
        let (base, server) = serve_once("200 OK", INDEX);
        let config = ModelsConfig {
            directory: format!("{base}/models"),
            ..ModelsConfig::default()
        };

        let ids = resolve_model_ids(&config, &local_client());
        server.join().unwrap();
        assert_eq!(
            ids,
            vec![
                format!("{base}/models/star.glb"),
                format!("{base}/models/Heart.GLB"),
                format!("{base}/models/moon.glb"),
                format!("{base}/other/comet.glb?v=2"),
            ]
        );
    }

    #[test]
    fn server_error_fails_the_download() {
        let (base, server) = serve_once("500 Internal Server Error", "boom");
        let id = format!("{base}/models/star.glb");

        let err = fetch_model_bytes(&local_client(), &id).unwrap_err();
        assert_eq!(server.join().unwrap(), "/models/star.glb");
        assert!(format!("{err:#}").contains("failed to download"));
    }
}
