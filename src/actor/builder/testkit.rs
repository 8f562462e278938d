//! Fake Go / TinyGo toolchains for builder tests.
//!
//! The fake compiler writes `<name>:<args>` into the `-o` target, answers
//! `env GOROOT` / `env TINYGOROOT` with a directory holding a `wasm_exec.js`,
//! and fails while a `FAIL` marker file exists next to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::actor::messages::CoordinatorMsg;

pub(crate) struct FakeToolchain {
    pub program: PathBuf,
    pub fail_marker: PathBuf,
    pub root: PathBuf,
}

impl FakeToolchain {
    /// Create `dir/<name>` plus its root at `dir/<name>-root`.
    ///
    /// `loader_rel` is where `wasm_exec.js` lives under the root.
    pub(crate) fn install(dir: &Path, name: &str, loader_rel: &str) -> Self {
        let root = dir.join(format!("{name}-root"));
        let loader = root.join(loader_rel);
        std::fs::create_dir_all(loader.parent().unwrap()).unwrap();
        std::fs::write(&loader, format!("/*{name} loader*/class Go{{}}")).unwrap();

        let fail_marker = dir.join(format!("{name}.FAIL"));
        let program = dir.join(name);
        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "env" ]; then
  echo "{root}"
  exit 0
fi
if [ -f "{fail}" ]; then
  echo "web/main.go:3:1: syntax error: unexpected }}" >&2
  exit 2
fi
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
printf '%s' "{name}:$*" > "$out"
"#,
            root = root.display(),
            fail = fail_marker.display(),
        );
        write_executable(&program, &script);

        Self {
            program,
            fail_marker,
            root,
        }
    }

    pub(crate) fn go(dir: &Path) -> Self {
        Self::install(dir, "go", "lib/wasm/wasm_exec.js")
    }

    pub(crate) fn tinygo(dir: &Path) -> Self {
        Self::install(dir, "tinygo", "targets/wasm_exec.js")
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        if failing {
            std::fs::write(&self.fail_marker, "").unwrap();
        } else {
            let _ = std::fs::remove_file(&self.fail_marker);
        }
    }

    pub(crate) fn program_str(&self) -> String {
        self.program.display().to_string()
    }
}

pub(crate) fn write_executable(path: &Path, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, script).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// Next coordinator message, failing the test after a generous timeout.
pub(crate) async fn next_msg(rx: &mut mpsc::Receiver<CoordinatorMsg>) -> CoordinatorMsg {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for coordinator message")
        .expect("coordinator channel closed")
}

/// Assert nothing arrives within `wait`.
pub(crate) async fn assert_quiet(rx: &mut mpsc::Receiver<CoordinatorMsg>, wait: Duration) {
    if let Ok(Some(msg)) = tokio::time::timeout(wait, rx.recv()).await {
        panic!("unexpected coordinator message: {msg:?}");
    }
}
