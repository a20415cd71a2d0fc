//! Shared utilities for integration tests: programmable mock backends and
//! a proxy harness bound to ephemeral ports.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rproxy::config::ProxyConfig;
use rproxy::http::server::{build_router, AppState, ListenerScheme};

/// A mock origin server capturing every request it receives.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw requests (head + body) seen so far, lowercased header names
    /// preserved as sent.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock backend answering every request via `handler`, which
/// receives the raw request (head + body) it is answering.
pub async fn start_backend<F, Fut>(handler: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    {
        let hits = hits.clone();
        let requests = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hits = hits.clone();
                let requests = requests.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let raw = read_request(&mut socket).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    requests.lock().unwrap().push(raw.clone());

                    let (status, body) = handler(raw).await;
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
    }

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// A backend that always answers 200 with a fixed body.
pub async fn start_ok_backend(body: &'static str) -> MockBackend {
    start_backend(move |_req| async move { (200, body.to_string()) }).await
}

/// Read one full HTTP/1.1 request (head plus content-length body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break buf.len(),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break pos;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let header = |name: &str| {
        head.lines().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    };
    let content_length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let chunked = header("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    let mut body = buf[header_end.min(buf.len())..].to_vec();
    // Strip the blank line separating head from body.
    if body.starts_with(b"\r\n\r\n") {
        body.drain(..4);
    }
    let done = |body: &[u8]| {
        if chunked {
            body.windows(5).any(|w| w == b"0\r\n\r\n")
        } else {
            body.len() >= content_length
        }
    };
    while !done(&body) {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    format!("{}\r\n\r\n{}", head, String::from_utf8_lossy(&body))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// A proxy instance serving its public router on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config rooted in temp directories so tests never touch system paths.
pub fn test_config(root: &std::path::Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.paths.config_dir = root.join("etc");
    config.paths.data_dir = root.join("data");
    config
}

/// Start a proxy with the given config, serving the plain-HTTP router.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let state = AppState::new(Arc::new(config)).expect("app state should build");
    let router = build_router(state.clone(), ListenerScheme::Http);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    TestProxy { addr, state }
}

/// A reqwest client that neither pools nor proxies; one connection per
/// request keeps mock backends simple.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Issue a raw HTTP/1.1 request and return (status, headers, body).
/// Needed where reqwest would refuse to send the malformed input under
/// test (e.g. an invalid Host header).
pub async fn raw_request(
    addr: SocketAddr,
    request: &str,
) -> (u16, Vec<(String, String)>, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response).to_string();

    let status: u16 = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status line");

    let (head, body) = response
        .split_once("\r\n\r\n")
        .map(|(h, b)| (h.to_string(), b.to_string()))
        .unwrap_or((response.clone(), String::new()));

    let headers = head
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect();

    (status, headers, body)
}
