//! WebSocket live reload.
//!
//! Pages load `script.js`, whose runtime initializer connects to this socket
//! and calls `location.reload()` on a `reload` text frame.

use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::{Browser, app_url};

/// Successive ports tried when the configured one is taken.
const MAX_PORT_RETRIES: u16 = 10;
const ACCEPT_POLL: Duration = Duration::from_millis(100);
const RELOAD_FRAME: &str = "reload";

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub struct LiveReload {
    port: u16,
    clients: Clients,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    url: Option<String>,
}

impl LiveReload {
    /// Bind `base_port` (or the next free one) and start accepting pages.
    pub fn start(base_port: u16) -> Result<Self> {
        let (listener, port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;
        if port != base_port {
            crate::warn!("reload"; "port {} taken, live reload on {}", base_port, port);
        }

        let clients = Clients::default();
        let stop = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let clients = Arc::clone(&clients);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("livereload".into())
                .spawn(move || accept_loop(&listener, &clients, &stop))?
        };

        crate::debug!("reload"; "listening on ws://127.0.0.1:{}", port);
        Ok(Self {
            port,
            clients,
            stop,
            acceptor: Some(acceptor),
            url: None,
        })
    }

    /// Actual port, baked into the runtime initializer.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// App URL once `open` has been called.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn broadcast(&self, msg: &Message) -> usize {
        let mut clients = self.clients.lock();
        clients.retain_mut(|ws| match ws.send(msg.clone()) {
            Ok(()) => true,
            Err(e) => {
                crate::debug!("reload"; "page disconnected: {}", e);
                false
            }
        });
        clients.len()
    }
}

impl Browser for LiveReload {
    fn open(&mut self, port: u16, https: bool) {
        let url = app_url(port, https);
        crate::ok!("reload"; "open {}", url);
        self.url = Some(url);
    }

    fn reload(&mut self) {
        let sent = self.broadcast(&Message::Text(RELOAD_FRAME.into()));
        crate::debug!("reload"; "reload sent to {} pages", sent);
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for mut ws in self.clients.lock().drain(..) {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LiveReload {
    fn drop(&mut self) {
        if self.acceptor.is_some() {
            self.close();
        }
    }
}

fn accept_loop(listener: &TcpListener, clients: &Clients, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                // Handshake in blocking mode.
                let _ = stream.set_nonblocking(false);
                match tungstenite::accept(stream) {
                    Ok(ws) => {
                        crate::debug!("reload"; "page connected from {}", addr);
                        clients.lock().push(ws);
                    }
                    Err(e) => crate::debug!("reload"; "handshake with {} failed: {}", addr, e),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                crate::debug!("reload"; "accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Bind `base_port`, moving up one port at a time while it is taken.
fn try_bind_port(base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                return Ok((listener, port));
            }
            Err(e) => last_error = Some(e),
        }
    }
    anyhow::bail!(
        "cannot bind live reload socket after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )
}
