//! External command execution.
//!
//! Builder-based API over `tokio::process` for toolchain invocations. Every
//! run observes the shutdown signal: an in-flight command gets a grace period
//! to finish and is killed after it.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! let output = Cmd::new("go")
//!     .args(["build", "-o", ".server.tmp", "web/server.go"])
//!     .cwd(root)
//!     .envs([("CGO_ENABLED", "0")])
//!     .run(&shutdown)
//!     .await?;
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use crate::core::Shutdown;

/// How long a running command may continue after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    filter: &'static FilterRule,
    grace: Duration,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            filter: &EMPTY_FILTER,
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Set environment variables for the subprocess.
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in vars {
            self.envs.push((k.as_ref().to_owned(), v.as_ref().to_owned()));
        }
        self
    }

    /// Set output filter for error messages.
    pub fn filter(mut self, filter: &'static FilterRule) -> Self {
        self.filter = filter;
        self
    }

    /// Override the shutdown grace period.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Get the program name for error messages.
    fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Display form used in debug logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, returning the output of a successful exit.
    ///
    /// A non-zero exit becomes an error carrying the filtered compiler output.
    pub async fn run(self, shutdown: &Shutdown) -> Result<Output> {
        let name = self.program_name();
        crate::debug!("exec"; "{}", self.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute `{name}`"))?;

        let output = child.wait_with_output();
        tokio::pin!(output);

        let output = tokio::select! {
            res = &mut output => res,
            _ = shutdown.wait() => match tokio::time::timeout(self.grace, &mut output).await {
                Ok(res) => res,
                // Dropping the future drops the child, which kills it.
                Err(_) => anyhow::bail!("`{name}` killed on shutdown"),
            },
        }
        .with_context(|| format!("Failed to wait for `{name}`"))?;

        if !output.status.success() {
            anyhow::bail!(format_error(&name, &output, self.filter));
        }
        Ok(output)
    }
}

/// Resolve a toolchain binary on PATH (or as given, if it is a path).
pub fn find_program(program: &str) -> Result<PathBuf> {
    which::which(program).with_context(|| format!("`{program}` not found in PATH"))
}

// ============================================================================
// Output Filtering
// ============================================================================

/// Filter rule for command output.
///
/// Used to reduce noise by skipping known irrelevant lines.
pub struct FilterRule {
    /// Prefixes to skip.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    /// Create a new filter rule.
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Check if a line should be skipped.
    fn should_skip(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Lines that pass the filter, ANSI codes stripped.
    pub fn apply(&self, output: &str) -> String {
        output
            .lines()
            .map(strip_ansi)
            .filter(|line| !self.should_skip(line.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Go prints `# package` headers before the diagnostics of each package.
pub const GO_FILTER: FilterRule = FilterRule::new(&["# "]);

// ============================================================================
// Helpers
// ============================================================================

/// Strip ANSI escape codes from string.
fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Format error message for failed command.
fn format_error(name: &str, output: &Output, filter: &FilterRule) -> String {
    let stderr = filter.apply(&String::from_utf8_lossy(&output.stderr));
    let stdout = filter.apply(&String::from_utf8_lossy(&output.stdout));

    let mut msg = format!("Command `{name}` failed with {}", output.status);
    for part in [stderr.trim(), stdout.trim()] {
        if !part.is_empty() {
            msg.push('\n');
            msg.push_str(part);
        }
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
