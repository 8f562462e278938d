//! Logging with colored component prefixes and per-component streams.
//!
//! This module provides:
//! - `log!` / `ok!` / `warn!` / `err!` macros for terminal output
//! - `debug!` for lines shown only with `--verbose`
//! - `subscribe()` for consumers (UI, MCP bridge) that want the raw lines
//!
//! # Example
//!
//! ```ignore
//! log!("wasm"; "building with {}", toolchain);
//! err!("server"; "build failed\n{}", output);
//!
//! // Tag a line with the build attempt it belongs to
//! logger::emit("server", Severity::Info, Some(op), line);
//! ```

use std::io::{Write, stdout};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::{
    execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use tokio::sync::broadcast;

use crate::core::OpId;

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Terminal echo (disabled in tests to keep output readable)
static ECHO: AtomicBool = AtomicBool::new(true);

/// Lines kept for slow subscribers before they start lagging.
const STREAM_CAPACITY: usize = 1024;

static STREAM: LazyLock<broadcast::Sender<LogLine>> =
    LazyLock::new(|| broadcast::channel(STREAM_CAPACITY).0);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Stop printing to the terminal; streams still receive every line.
pub fn set_echo(enabled: bool) {
    ECHO.store(enabled, Ordering::SeqCst);
}

// ============================================================================
// Log Lines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Ok,
    Warn,
    Err,
}

/// One line in a component's log stream.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogLine {
    pub component: &'static str,
    pub severity: Severity,
    pub op: Option<OpId>,
    pub text: String,
}

/// Receive every line logged from now on, from all components.
pub fn subscribe() -> broadcast::Receiver<LogLine> {
    STREAM.subscribe()
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::emit($module, $crate::logger::Severity::Info, None, format!($($arg)*))
    }};
}

/// Log a success line (green check)
#[macro_export]
macro_rules! ok {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::emit($module, $crate::logger::Severity::Ok, None, format!($($arg)*))
    }};
}

/// Log a warning line (yellow)
#[macro_export]
macro_rules! warn {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::emit($module, $crate::logger::Severity::Warn, None, format!($($arg)*))
    }};
}

/// Log an error line (red cross)
#[macro_export]
macro_rules! err {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::emit($module, $crate::logger::Severity::Err, None, format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::print($module, $crate::logger::Severity::Info, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a line in the component stream and echo it to the terminal.
pub fn emit(component: &'static str, severity: Severity, op: Option<OpId>, text: String) {
    print(component, severity, &text);
    // No subscribers is fine: the terminal is the default sink.
    let _ = STREAM.send(LogLine {
        component,
        severity,
        op,
        text,
    });
}

/// Print a message with a colored module prefix
#[inline]
pub fn print(module: &str, severity: Severity, message: &str) {
    if !ECHO.load(Ordering::Relaxed) {
        return;
    }

    let prefix = colorize_prefix(module);
    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();

    match severity {
        Severity::Info => writeln!(stdout, "{prefix} {message}").ok(),
        Severity::Ok => writeln!(stdout, "{prefix} {} {message}", "✓".green()).ok(),
        Severity::Warn => writeln!(stdout, "{prefix} {} {}", "⚠".yellow(), message.yellow()).ok(),
        Severity::Err => writeln!(stdout, "{prefix} {} {message}", "✗".red()).ok(),
    };

    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module {
        "serve" | "server" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "wasm" => prefix.bright_magenta().bold().to_string(),
        "assets" => prefix.bright_cyan().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
