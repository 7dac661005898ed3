//! Local HTTP fixture standing in for the metastore and its file hosts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone)]
struct Route {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
}

/// Serves canned responses on 127.0.0.1 until the test process exits.
/// Unknown paths answer 404.
#[derive(Clone)]
pub struct FixtureServer {
    base_url: String,
    shared: Arc<Mutex<Shared>>,
}

impl FixtureServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture server");
        let addr = listener.local_addr().expect("fixture address");
        let shared = Arc::new(Mutex::new(Shared::default()));

        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let shared = Arc::clone(&accept_shared);
                thread::spawn(move || {
                    let _ = handle_connection(stream, &shared);
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            shared,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn csv(&self, path: &str, body: &str) {
        self.route(path, 200, "text/csv", body.as_bytes().to_vec());
    }

    pub fn json(&self, path: &str, body: &serde_json::Value) {
        let body = serde_json::to_vec(body).expect("serialize fixture json");
        self.route(path, 200, "application/json", body);
    }

    pub fn status(&self, path: &str, status: u16) {
        self.route(path, status, "text/plain", b"fixture error".to_vec());
    }

    pub fn hits(&self, path: &str) -> usize {
        let shared = self.shared.lock().expect("fixture lock");
        shared.hits.get(path).copied().unwrap_or(0)
    }

    fn route(&self, path: &str, status: u16, content_type: &'static str, body: Vec<u8>) {
        let mut shared = self.shared.lock().expect("fixture lock");
        shared.routes.insert(
            path.to_string(),
            Route {
                status,
                content_type,
                body,
            },
        );
    }
}

fn handle_connection(mut stream: TcpStream, shared: &Mutex<Shared>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 4096];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        request.extend_from_slice(&buffer[..read]);
    }

    let request = String::from_utf8_lossy(&request);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let route = {
        let mut shared = shared.lock().expect("fixture lock");
        *shared.hits.entry(path.clone()).or_insert(0) += 1;
        shared.routes.get(&path).cloned()
    };
    let route = route.unwrap_or(Route {
        status: 404,
        content_type: "text/plain",
        body: b"not found".to_vec(),
    });

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason(route.status),
        route.content_type,
        route.body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(&route.body)?;
    stream.flush()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Metastore item shaped like the live catalog (array theme, CSV distribution).
pub fn item(id: &str, theme: &str, modified: &str, download: Option<&str>) -> serde_json::Value {
    let distribution = match download {
        Some(url) => serde_json::json!([{ "downloadURL": url, "mediaType": "text/csv" }]),
        None => serde_json::json!([]),
    };
    serde_json::json!({
        "identifier": id,
        "title": format!("Dataset {id}"),
        "theme": [theme],
        "modified": modified,
        "distribution": distribution,
    })
}
