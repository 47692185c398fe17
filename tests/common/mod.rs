//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Query parameters of one request received by a mock subscriber.
pub type Query = HashMap<String, String>;

/// A subscriber callback endpoint bound to an ephemeral port.
#[allow(dead_code)]
pub struct MockSubscriber {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Query>>>,
}

impl MockSubscriber {
    #[allow(dead_code)]
    pub fn callback_url(&self) -> String {
        format!("http://{}/callback", self.addr)
    }

    #[allow(dead_code)]
    pub fn received(&self) -> Vec<Query> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a subscriber that echoes `hub.challenge` with 200.
#[allow(dead_code)]
pub async fn start_echo_subscriber() -> MockSubscriber {
    start_programmable_subscriber(|query| {
        (200, query.get("hub.challenge").cloned().unwrap_or_default())
    })
    .await
}

/// Start a subscriber whose answer is computed from the request query.
#[allow(dead_code)]
pub async fn start_programmable_subscriber<F>(f: F) -> MockSubscriber
where
    F: Fn(&Query) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let seen = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let head = String::from_utf8_lossy(&buf);
                        let target = head
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/");
                        let query: Query = url::Url::parse(&format!("http://localhost{}", target))
                            .map(|u| u.query_pairs().into_owned().collect())
                            .unwrap_or_default();

                        let (status, body) = f(&query);
                        seen.lock().unwrap().push(query);

                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockSubscriber { addr, requests }
}

/// Build a form-encoded `POST` to the hub endpoint.
#[allow(dead_code)]
pub fn hub_request(path: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
