//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipehub::lifecycle::ShutdownReport;
use pipehub::pipe::{handler_fn, BoxFuture, BoxHandler, Pipe, PipeCatalog, PipeContext, PipeError};
use pipehub::{parse_config, Hub, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Start a mock backend on an ephemeral port. It answers every request with
/// 200 and the request target (path and query) as the body.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
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
                        let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-backend: mock\r\nConnection: close\r\n\r\n{}",
                            target.len(),
                            target
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

#[derive(Clone, Copy)]
pub enum Behavior {
    /// Prepends its alias to the `x-pipes` response header.
    Tag,
    /// Fails every request.
    Fail,
    /// Panics on every request.
    Boom,
    /// Signals [`TestHub::entered`], then waits before passing the request
    /// on. Fails the request if the pipe was closed while it waited.
    Slow(Duration),
    /// Tags requests, but never finishes closing.
    HangOnClose,
}

/// Pipe used by the integration tests; counts how often it is closed.
pub struct TestPipe {
    alias: String,
    behavior: Behavior,
    closed: Arc<AtomicUsize>,
    entered: Arc<Notify>,
}

impl Pipe for TestPipe {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        let alias = self.alias.clone();
        let behavior = self.behavior;
        let closed = Arc::clone(&self.closed);
        let entered = Arc::clone(&self.entered);
        handler_fn(move |req| {
            let next = next.clone();
            let alias = alias.clone();
            let closed = Arc::clone(&closed);
            let entered = Arc::clone(&entered);
            async move {
                match behavior {
                    Behavior::Fail => return Err(PipeError::msg(format!("{alias} refused the request"))),
                    Behavior::Boom => panic!("{alias} exploded"),
                    Behavior::Slow(delay) => {
                        entered.notify_one();
                        tokio::time::sleep(delay).await;
                        if closed.load(Ordering::SeqCst) > 0 {
                            return Err(PipeError::msg(format!("{alias} was closed mid-request")));
                        }
                    }
                    Behavior::Tag | Behavior::HangOnClose => {}
                }

                let mut res = next.call(req).await?;
                let trail = match res.headers().get("x-pipes").and_then(|v| v.to_str().ok()) {
                    Some(inner) => format!("{alias},{inner}"),
                    None => alias,
                };
                res.headers_mut().insert(
                    "x-pipes",
                    trail.parse().map_err(|_| PipeError::msg("bad header"))?,
                );
                Ok::<_, PipeError>(res)
            }
        })
    }

    fn close(&self, _deadline: Option<Instant>) -> BoxFuture<'_, Result<(), PipeError>> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        let hang = matches!(self.behavior, Behavior::HangOnClose);
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}

/// The built-in pipes plus every [`Behavior`] under `test/*` at `v1`, and
/// `test/faulty`, which reports an async error 50ms after it is created.
pub fn catalog(closed: &Arc<AtomicUsize>, entered: &Arc<Notify>) -> PipeCatalog {
    let mut catalog = PipeCatalog::with_builtins();
    for (identity, behavior) in [
        ("test/tag", Behavior::Tag),
        ("test/fail", Behavior::Fail),
        ("test/boom", Behavior::Boom),
        ("test/slow", Behavior::Slow(Duration::from_millis(300))),
        ("test/hang-on-close", Behavior::HangOnClose),
    ] {
        let closed = Arc::clone(closed);
        let entered = Arc::clone(entered);
        catalog.register(identity, "v1", move |ctx: PipeContext| {
            Ok(TestPipe {
                alias: ctx.alias,
                behavior,
                closed: Arc::clone(&closed),
                entered: Arc::clone(&entered),
            })
        });
    }

    let closed = Arc::clone(closed);
    let entered = Arc::clone(entered);
    catalog.register("test/faulty", "v1", move |ctx: PipeContext| {
        let errors = ctx.errors.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            errors.report("upstream credentials expired");
        });
        Ok(TestPipe {
            alias: ctx.alias,
            behavior: Behavior::Tag,
            closed: Arc::clone(&closed),
            entered: Arc::clone(&entered),
        })
    });
    catalog
}

/// A hub serving on an ephemeral port.
pub struct TestHub {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub closed: Arc<AtomicUsize>,
    /// Notified each time a request enters a `test/slow` pipe.
    pub entered: Arc<Notify>,
    pub handle: JoinHandle<ShutdownReport>,
}

impl TestHub {
    /// Bootstrap `source` with [`catalog`] and start serving.
    pub async fn spawn(source: &str) -> Self {
        let closed = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Notify::new());
        let config = parse_config(source).unwrap();
        let hub = Hub::bootstrap(&config, &catalog(&closed, &entered))
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = hub.shutdown();
        let handle = tokio::spawn(hub.run(listener));

        Self {
            addr,
            shutdown,
            closed,
            entered,
            handle,
        }
    }

    /// Send a GET for `path` with the given `Host` header.
    pub async fn get(&self, host: &str, path: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("http://{}{}", self.addr, path))
            .header(reqwest::header::HOST, host)
            .send()
            .await
            .unwrap()
    }

    /// Start a GET in the background and return once it has reached the
    /// `test/slow` pipe.
    pub async fn get_in_flight(
        &self,
        host: &str,
        path: &str,
    ) -> JoinHandle<reqwest::Result<reqwest::Response>> {
        let request = reqwest::Client::new()
            .get(format!("http://{}{}", self.addr, path))
            .header(reqwest::header::HOST, host)
            .send();
        let handle = tokio::spawn(request);
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .unwrap();
        handle
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the hub to finish shutting down.
    pub async fn report(&mut self) -> ShutdownReport {
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .unwrap()
            .unwrap()
    }
}
