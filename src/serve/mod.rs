//! Internal static file server.
//!
//! Used when the project has no `web/server.go`: serves `web/public` on the
//! app port. `/client.wasm` comes from the in-memory artifact when the WASM
//! builder publishes to memory.

mod path;
mod response;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use tiny_http::{Request, Server};

use crate::config::layout::WASM_FILE;
use crate::core::MemoryArtifact;
use crate::utils::mime::types;

/// Bind attempts on the same port (a stopped user server may still hold it).
const MAX_BIND_ATTEMPTS: u32 = 10;
const BIND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Request handler threads.
const POOL_THREADS: usize = 4;

/// A running static server; stopping it joins the accept thread.
pub struct StaticServer {
    server: Arc<Server>,
    addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl StaticServer {
    /// Bind `interface:port` and start serving `public_dir`.
    pub fn start(
        interface: IpAddr,
        port: u16,
        public_dir: &Path,
        memory: MemoryArtifact,
    ) -> Result<Self> {
        let addr = SocketAddr::new(interface, port);
        let server = Arc::new(bind_with_retry(addr)?);

        let site = Site {
            public_dir: public_dir.to_path_buf(),
            memory,
        };
        let accept = Arc::clone(&server);
        let thread = thread::Builder::new()
            .name("static-server".into())
            .spawn(move || run_request_loop(&accept, Arc::new(site)))?;

        crate::debug!("serve"; "static files from {} on http://{}", public_dir.display(), addr);
        Ok(Self {
            server,
            addr,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Unblock the accept loop and wait for it to end.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_with_retry(addr: SocketAddr) -> Result<Server> {
    let mut attempt = 1;
    loop {
        match Server::http(addr) {
            Ok(server) => return Ok(server),
            Err(_) if attempt < MAX_BIND_ATTEMPTS => {
                attempt += 1;
                thread::sleep(BIND_RETRY_DELAY);
            }
            Err(e) => anyhow::bail!("cannot bind {} after {} attempts: {}", addr, attempt, e),
        }
    }
}

struct Site {
    public_dir: PathBuf,
    memory: MemoryArtifact,
}

fn run_request_loop(server: &Server, site: Arc<Site>) {
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(POOL_THREADS)
        .thread_name(|i| format!("static-{i}"))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            crate::err!("serve"; "cannot start request pool: {}", e);
            return;
        }
    };

    for request in server.incoming_requests() {
        let site = Arc::clone(&site);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &site) {
                crate::debug!("serve"; "request error: {e}");
            }
        });
    }
}

fn handle_request(request: Request, site: &Site) -> Result<()> {
    let url = path::normalize_url(request.url());

    if url == WASM_FILE
        && let Some(bytes) = site.memory.load()
    {
        return response::respond_bytes(request, types::WASM, &bytes);
    }

    match path::resolve_path(request.url(), &site.public_dir) {
        Some(file) => response::respond_file(request, &file),
        None => response::respond_not_found(request),
    }
}
