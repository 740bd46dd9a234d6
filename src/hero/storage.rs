use std::future::Future;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const LIST_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage responded with HTTP {0}")]
    Status(u16),
}

/// Object storage holding conventionally named post assets.
pub trait AssetStore {
    /// Public URL for `filename` built from the naming convention alone.
    fn public_url(&self, filename: &str) -> String;

    /// Public URL of an object listed under exactly `filename`, if any.
    fn find(&self, filename: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Whether `url` answers a HEAD request with 2xx.
    fn exists(&self, url: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Supabase-style storage over HTTP.
pub struct StorageClient {
    http: Client,
    base_url: String,
    bucket: String,
    key: Option<String>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

impl StorageClient {
    pub fn new(http: Client, base_url: &str, bucket: &str, key: Option<&str>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            key: key.map(str::to_string),
        }
    }

    fn list_url(&self) -> String {
        format!(
            "{}/storage/v1/object/list/{}",
            self.base_url,
            encode_path(&self.bucket)
        )
    }
}

impl AssetStore for StorageClient {
    fn public_url(&self, filename: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            encode_path(&self.bucket),
            encode_path(filename)
        )
    }

    async fn find(&self, filename: &str) -> Result<Option<String>, StoreError> {
        // Listing needs credentials; without them the convention URL is all we have.
        let Some(key) = &self.key else {
            return Ok(None);
        };

        let resp = self
            .http
            .post(self.list_url())
            .header("apikey", key)
            .bearer_auth(key)
            .json(&json!({ "prefix": "", "search": filename, "limit": LIST_LIMIT }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status().as_u16()));
        }

        let objects: Vec<ListedObject> = resp.json().await?;
        debug!(filename, listed = objects.len(), "storage listing");
        Ok(objects
            .iter()
            .find(|o| o.name == filename)
            .map(|o| self.public_url(&o.name)))
    }

    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let resp = self.http.head(url).send().await?;
        Ok(resp.status().is_success())
    }
}

/// Percent-encode each `/`-separated segment on its own.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Responder = fn(&str) -> (u16, &'static str);

    /// Local HTTP responder: one request per connection, every raw request recorded.
    async fn spawn_http(respond: Responder) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                let (status, body) = respond(&request);
                seen.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{}", addr), requests)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn listing(request: &str) -> (u16, &'static str) {
        if request.starts_with("POST /storage/v1/object/list/blog-images ") {
            (200, r#"[{"name":"reef.jpg.bak"},{"name":"reef.jpg"},{"name":"wreck.png"}]"#)
        } else {
            (404, "")
        }
    }

    fn keyed_client(base: &str) -> StorageClient {
        let http = Client::builder().no_proxy().build().unwrap();
        StorageClient::new(http, base, "blog-images", Some("secret"))
    }

    #[test]
    fn public_url_shape() {
        let store = StorageClient::new(Client::new(), "https://abc.supabase.co/", "blog-images", None);
        assert_eq!(
            store.public_url("night-dive.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/blog-images/night-dive.jpg"
        );
    }

    #[test]
    fn segments_encoded_independently() {
        assert_eq!(encode_path("caf\u{e9} dives/a&b.png"), "caf%C3%A9%20dives/a%26b.png");
        assert_eq!(encode_path("what's-new.webp"), "what's-new.webp");
    }

    #[tokio::test]
    async fn find_without_key_skips_listing() {
        let store = StorageClient::new(Client::new(), "http://127.0.0.1:9", "blog-images", None);
        assert_eq!(store.find("reef.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_returns_exact_listed_name() {
        let (base, requests) = spawn_http(listing).await;
        let store = keyed_client(&base);

        let found = store.find("reef.jpg").await.unwrap();
        assert_eq!(found, Some(format!("{}/storage/v1/object/public/blog-images/reef.jpg", base)));

        let requests = requests.lock().unwrap();
        let request = requests[0].to_ascii_lowercase();
        assert!(request.contains("apikey: secret"));
        assert!(request.contains("authorization: bearer secret"));
        assert!(request.contains(r#""search":"reef.jpg""#));
    }

    #[tokio::test]
    async fn find_ignores_partial_name_matches() {
        let (base, _) = spawn_http(listing).await;
        assert_eq!(keyed_client(&base).find("reef.jp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_reports_listing_status() {
        let (base, _) = spawn_http(|_| (500, r#"{"error":"boom"}"#)).await;
        let err = keyed_client(&base).find("reef.jpg").await.unwrap_err();
        assert!(matches!(err, StoreError::Status(500)));
    }

    #[tokio::test]
    async fn exists_follows_head_status() {
        let (base, requests) = spawn_http(|request| {
            if request.starts_with("HEAD /storage/v1/object/public/blog-images/reef.webp ") {
                (200, "")
            } else {
                (404, "")
            }
        })
        .await;
        let store = keyed_client(&base);

        assert!(store.exists(&store.public_url("reef.webp")).await.unwrap());
        assert!(!store.exists(&store.public_url("reef.png")).await.unwrap());
        assert!(requests.lock().unwrap().iter().all(|r| r.starts_with("HEAD ")));
    }

    #[tokio::test]
    async fn exists_reports_transport_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let store = keyed_client(&format!("http://{}", addr));
        let err = store.exists(&store.public_url("reef.jpg")).await.unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
    }
}
