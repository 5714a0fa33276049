//! Shared helpers for integration tests: minimal upstream stubs speaking
//! just enough HTTP/1.1 for the forwarder, plus request plumbing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Hand-rolled upstream test server.
///
/// Answers every request with the configured status and a body of
/// `<tag>||<request head>`, so tests can assert both which target served a
/// request and what the gateway actually sent upstream. Mutating `status`
/// or `delay_ms` affects subsequent requests.
pub struct UpstreamStub {
    pub addr: SocketAddr,
    pub status: Arc<AtomicU16>,
    pub hits: Arc<AtomicU64>,
    pub delay_ms: Arc<AtomicU64>,
}

impl UpstreamStub {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub async fn spawn_upstream(tag: &'static str) -> UpstreamStub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = Arc::new(AtomicU16::new(200));
    let hits = Arc::new(AtomicU64::new(0));
    let delay_ms = Arc::new(AtomicU64::new(0));

    let (status_ref, hits_ref, delay_ref) = (status.clone(), hits.clone(), delay_ms.clone());
    actix_web::rt::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let status = status_ref.clone();
            let hits = hits_ref.clone();
            let delay = delay_ref.clone();
            actix_web::rt::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();

                hits.fetch_add(1, Ordering::SeqCst);

                let wait = delay.load(Ordering::SeqCst);
                if wait > 0 {
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }

                let code = status.load(Ordering::SeqCst);
                let reason = match code {
                    200 => "OK",
                    301 => "Moved Permanently",
                    404 => "Not Found",
                    429 => "Too Many Requests",
                    500 => "Internal Server Error",
                    503 => "Service Unavailable",
                    _ => "Status",
                };
                let body = format!("{}||{}", tag, head);
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    code,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    UpstreamStub {
        addr,
        status,
        hits,
        delay_ms,
    }
}

/// Collects a (possibly streamed) response body into a string.
pub async fn body_string(resp: HttpResponse) -> String {
    let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Which stub served a `tag||head` body.
pub fn served_by(body: &str) -> &str {
    body.split("||").next().unwrap_or("")
}
