//! Loopback stub origins and counting inspectors for the scenario tests.
//!
//! Everything here is `spawn_local`-based: the stubs share the test's
//! reactor thread with the client under test, which keeps accept order and
//! counters deterministic for sequential requests.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    future::Future,
    net::SocketAddr,
    rc::Rc,
    time::Duration,
};

use efflux::{Error, Inspect, Request, Response};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

pub async fn with_local<T>(fut: impl Future<Output = T>) -> T {
    trace_init();
    tokio::task::LocalSet::new().run_until(fut).await
}

/// Route engine tracing to the test output; `RUST_LOG=efflux=trace` shows
/// every pool transition.
pub fn trace_init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// How a stub origin answers each request it reads.
#[derive(Clone)]
pub enum Behavior {
    /// `200` with a `content-length` body, connection left open.
    KeepAlive { body: String },
    /// `200` with a chunked body (plus a trailer), connection left open.
    Chunked { chunks: Vec<String> },
    /// `200` with `connection: close`, then closes.
    Close { body: String },
    /// Reads the request and never answers.
    Stall,
    /// Answers keep-alive, then closes the socket after a delay.
    KeepAliveThenClose { body: String, close_after: Duration },
    /// Sends the head and half the body, sleeps, then finishes.
    SlowBody { body: String, delay: Duration },
    /// Sends the body one piece at a time with a pause before each piece.
    Trickle { pieces: Vec<String>, gap: Duration },
    /// Echoes the request body back, keep-alive.
    Echo,
    /// Writes these bytes verbatim for every request, then closes.
    Raw { bytes: Vec<u8> },
}

pub struct StubServer {
    pub addr: SocketAddr,
    accepted: Rc<Cell<usize>>,
    served: Rc<Cell<usize>>,
}

impl StubServer {
    pub async fn spawn(behavior: Behavior) -> StubServer {
        StubServer::bind("127.0.0.1:0", behavior, None).await
    }

    /// Bind a tagged stub that records its accepts into a shared log, for
    /// asserting dial order across several origins.
    pub async fn bind(
        addr: &str,
        behavior: Behavior,
        accept_log: Option<(&'static str, Rc<RefCell<Vec<&'static str>>>)>,
    ) -> StubServer {
        let listener = TcpListener::bind(addr).await.expect("bind stub origin");
        let addr = listener.local_addr().unwrap();
        let accepted = Rc::new(Cell::new(0));
        let served = Rc::new(Cell::new(0));

        let accepted_in_loop = accepted.clone();
        let served_in_loop = served.clone();
        tokio::task::spawn_local(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accepted_in_loop.set(accepted_in_loop.get() + 1);
                if let Some((tag, log)) = &accept_log {
                    log.borrow_mut().push(tag);
                }
                let behavior = behavior.clone();
                let served = served_in_loop.clone();
                tokio::task::spawn_local(handle_connection(stream, behavior, served));
            }
        });

        StubServer {
            addr,
            accepted,
            served,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.get()
    }

    /// Requests answered (or swallowed) so far.
    pub fn served(&self) -> usize {
        self.served.get()
    }
}

async fn handle_connection(mut stream: TcpStream, behavior: Behavior, served: Rc<Cell<usize>>) {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let Some(request_body) = read_request(&mut stream, &mut buf).await else {
            return;
        };
        served.set(served.get() + 1);

        match &behavior {
            Behavior::KeepAlive { body } => {
                if write_simple(&mut stream, body, false).await.is_err() {
                    return;
                }
            }
            Behavior::Chunked { chunks } => {
                let mut response =
                    b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n".to_vec();
                for chunk in chunks {
                    response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    response.extend_from_slice(chunk.as_bytes());
                    response.extend_from_slice(b"\r\n");
                }
                response.extend_from_slice(b"0\r\nx-trailer: done\r\n\r\n");
                if stream.write_all(&response).await.is_err() {
                    return;
                }
            }
            Behavior::Close { body } => {
                let _ = write_simple(&mut stream, body, true).await;
                return;
            }
            Behavior::Stall => {
                // Keep the socket open, send nothing.
                std::future::pending::<()>().await;
            }
            Behavior::KeepAliveThenClose { body, close_after } => {
                if write_simple(&mut stream, body, false).await.is_err() {
                    return;
                }
                tokio::time::sleep(*close_after).await;
                return;
            }
            Behavior::SlowBody { body, delay } => {
                let mid = body.len() / 2;
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n",
                    body.len()
                );
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = stream.write_all(&body.as_bytes()[..mid]).await;
                tokio::time::sleep(*delay).await;
                if stream.write_all(&body.as_bytes()[mid..]).await.is_err() {
                    return;
                }
            }
            Behavior::Trickle { pieces, gap } => {
                let total: usize = pieces.iter().map(String::len).sum();
                let head = format!("HTTP/1.1 200 OK\r\ncontent-length: {total}\r\n\r\n");
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for piece in pieces {
                    tokio::time::sleep(*gap).await;
                    if stream.write_all(piece.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
            Behavior::Echo => {
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n",
                    request_body.len()
                );
                let mut response = head.into_bytes();
                response.extend_from_slice(&request_body);
                if stream.write_all(&response).await.is_err() {
                    return;
                }
            }
            Behavior::Raw { bytes } => {
                let _ = stream.write_all(bytes).await;
                return;
            }
        }
    }
}

async fn write_simple(stream: &mut TcpStream, body: &str, close: bool) -> std::io::Result<()> {
    let connection = if close { "connection: close\r\n" } else { "" };
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n{connection}\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await
}

/// Read one request (head + declared body) off the socket. `None` on EOF.
async fn read_request(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let head_end = loop {
        if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let body = buf[head_end..head_end + content_length].to_vec();
    buf.drain(..head_end + content_length);
    Some(body)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Counts every inspector hook it sees; park one at the end of a chain and
/// fish it back out with `find_inspector`.
#[derive(Default)]
pub struct CountingInspector {
    pub requests: Cell<usize>,
    pub resolves: Cell<usize>,
    pub resolve_errors: Cell<usize>,
    pub connects: Cell<usize>,
    pub connect_errors: Cell<usize>,
    pub responses: Cell<usize>,
    pub errors: Cell<usize>,
    pub idle_errors: Cell<usize>,
}

impl Inspect for CountingInspector {
    fn on_request(&self, _req: &Request) {
        self.requests.set(self.requests.get() + 1);
    }

    fn on_resolve(&self, _host: &str, _ips: &[std::net::Ipv4Addr]) {
        self.resolves.set(self.resolves.get() + 1);
    }

    fn on_resolve_error(&self, _host: &str, _err: &Error) {
        self.resolve_errors.set(self.resolve_errors.get() + 1);
    }

    fn on_connect(&self, _peer: SocketAddr) {
        self.connects.set(self.connects.get() + 1);
    }

    fn on_connect_error(&self, _peer: SocketAddr, _err: &Error) {
        self.connect_errors.set(self.connect_errors.get() + 1);
    }

    fn on_response(&self, _peer: SocketAddr, _resp: &Response) {
        self.responses.set(self.responses.get() + 1);
    }

    fn on_error(&self, _peer: SocketAddr, was_idle: bool, _err: &Error) {
        if was_idle {
            self.idle_errors.set(self.idle_errors.get() + 1);
        } else {
            self.errors.set(self.errors.get() + 1);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
