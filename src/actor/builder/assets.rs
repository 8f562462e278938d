//! Asset Builder
//!
//! Keeps every project `.css` / `.js` file in an ordered bundle and writes
//! the minified `style.css` / `script.js`. The JS bundle starts with the
//! WASM loader of the active mode and ends with the runtime initializer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Inbox, Reporter};
use crate::actor::messages::{AssetMsg, Builder, CoordinatorMsg, EmitCause};
use crate::asset::Bundle;
use crate::asset::minify::minify;
use crate::config::Layout;
use crate::config::layout::WASM_FILE;
use crate::core::{FileEvent, FileEventKind, MediaType, OpCounter, OpId, Shutdown};
use crate::embed::runtime::{RUNTIME_JS, RuntimeVars};
use crate::utils::fs::write_atomic;

pub struct AssetBuilder {
    layout: Layout,
    css: Bundle,
    js: Bundle,
    loader: Arc<str>,
    runtime: String,
    /// Initial bundles written; later loader changes re-emit.
    scanned: bool,
    ops: OpCounter,
    inbox: Inbox<AssetMsg>,
    report: Reporter,
    shutdown: Shutdown,
}

impl AssetBuilder {
    pub fn new(
        layout: &Layout,
        livereload_port: u16,
        rx: mpsc::Receiver<AssetMsg>,
        coord: mpsc::Sender<CoordinatorMsg>,
        shutdown: Shutdown,
    ) -> Self {
        let runtime = RUNTIME_JS.render(&RuntimeVars {
            wasm_url: format!("/{WASM_FILE}"),
            livereload_port,
        });
        Self {
            layout: layout.clone(),
            css: Bundle::new(MediaType::Css),
            js: Bundle::new(MediaType::Js),
            loader: "".into(),
            runtime,
            scanned: false,
            ops: OpCounter::new(),
            inbox: Inbox::new(rx),
            report: Reporter::new(Builder::Assets, coord),
            shutdown,
        }
    }

    /// `script.js` and `style.css`.
    pub fn output_paths(&self) -> [PathBuf; 2] {
        MediaType::ALL.map(|media| self.layout.bundle_path(media))
    }

    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        while let Some(msg) = self.inbox.recv(&shutdown).await {
            match msg {
                AssetMsg::Ingest(event) => self.ingest(&event).await,
                AssetMsg::ScanComplete => {
                    self.scanned = true;
                    for media in MediaType::ALL {
                        self.emit(media, None, EmitCause::Source).await;
                    }
                }
                AssetMsg::SetLoader(loader) => {
                    self.loader = loader;
                    if self.scanned {
                        self.emit(MediaType::Js, None, EmitCause::Source).await;
                    }
                }
                AssetMsg::Refresh {
                    media,
                    loader,
                    cause,
                } => self.emit(media, loader, cause).await,
            }
        }
        crate::debug!("assets"; "stopped");
    }

    fn bundle_mut(&mut self, media: MediaType) -> &mut Bundle {
        match media {
            MediaType::Css => &mut self.css,
            MediaType::Js => &mut self.js,
        }
    }

    fn bundle(&self, media: MediaType) -> &Bundle {
        match media {
            MediaType::Css => &self.css,
            MediaType::Js => &self.js,
        }
    }

    /// Bundle key: path relative to the project root.
    fn logical_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.layout.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    async fn ingest(&mut self, event: &FileEvent) {
        let Some(media) = event.media() else {
            return;
        };
        if self.apply(media, event) && self.scanned {
            self.emit(media, None, EmitCause::Source).await;
        }
    }

    /// Update the bundle; returns whether the change must be emitted.
    fn apply(&mut self, media: MediaType, event: &FileEvent) -> bool {
        let key = self.logical_path(&event.path);
        match event.kind {
            // Never emit on create: a freshly scaffolded empty file must not
            // blank the bundle before it has content.
            FileEventKind::Create => {
                if self.bundle(media).contains(&key) {
                    return false;
                }
                match read_source(&event.path) {
                    Some(content) => {
                        self.bundle_mut(media).insert_new(key, content);
                    }
                    None => crate::debug!("assets"; "{} vanished before read", key.display()),
                }
                false
            }
            FileEventKind::Write | FileEventKind::RenameIn => match read_source(&event.path) {
                Some(content) => {
                    self.bundle_mut(media).upsert(key, content);
                    true
                }
                None => self.bundle_mut(media).remove(&key),
            },
            FileEventKind::Remove | FileEventKind::RenameOut => self.bundle_mut(media).remove(&key),
        }
    }

    /// Render, minify and write one bundle.
    ///
    /// `candidate` replaces the current loader only if the write succeeds.
    async fn emit(&mut self, media: MediaType, candidate: Option<Arc<str>>, cause: EmitCause) {
        let op = self.ops.next();
        self.report.started(op).await;

        let target = self.layout.bundle_path(media);
        let loader = candidate.as_deref().unwrap_or(&*self.loader);
        let bundle = self.bundle(media);
        let files = bundle.len();
        let text = bundle.render(loader, &self.runtime);

        let result = minify(media, &text)
            .and_then(|min| write_atomic(&target, min.as_bytes()).map(|()| min.len()));
        let success = match result {
            Ok(size) => {
                if let Some(loader) = candidate {
                    self.loader = loader;
                }
                log_emitted(op, &target, files, size, cause);
                true
            }
            Err(e) => {
                crate::err!("assets"; "{} {} not written: {:#}", op, media.label(), e);
                false
            }
        };

        self.report
            .send(CoordinatorMsg::AssetsEmitted {
                media,
                op,
                success,
                cause,
            })
            .await;
    }
}

fn log_emitted(op: OpId, target: &Path, files: usize, size: usize, cause: EmitCause) {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match cause {
        EmitCause::Source => crate::ok!("assets"; "{} {} ({} files, {} bytes)", op, name, files, size),
        EmitCause::Txn(txn) => crate::debug!("assets"; "{} {} for {} ({} bytes)", op, name, txn, size),
        EmitCause::Restore => crate::log!("assets"; "{} {} restored", op, name),
    }
}

/// File content, lossily decoded; `None` if it cannot be read.
fn read_source(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::messages::TxnId;
    use crate::deps::tests::{project, write};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        root: PathBuf,
        layout: Layout,
        tx: mpsc::Sender<AssetMsg>,
        rx: mpsc::Receiver<CoordinatorMsg>,
        shutdown: Shutdown,
    }

    impl Harness {
        async fn ingest(&self, path: &str, kind: FileEventKind) {
            let event = FileEvent::now(self.root.join(path), kind);
            self.tx.send(AssetMsg::Ingest(event)).await.unwrap();
        }

        fn read(&self, media: MediaType) -> String {
            std::fs::read_to_string(self.layout.bundle_path(media)).unwrap_or_default()
        }

        /// Next emission, skipping the `BuildStarted` that precedes it.
        async fn emitted(&mut self) -> (MediaType, bool, EmitCause) {
            loop {
                let msg = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                match msg {
                    CoordinatorMsg::BuildStarted { .. } => continue,
                    CoordinatorMsg::AssetsEmitted {
                        media,
                        success,
                        cause,
                        ..
                    } => return (media, success, cause),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }

        async fn quiet(&mut self) {
            let wait = tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await;
            assert!(wait.is_err(), "unexpected message: {wait:?}");
        }
    }

    async fn spawn(files: &[(&str, &str)]) -> Harness {
        let (temp, root) = project(files);
        std::fs::create_dir_all(root.join("web/public")).unwrap();
        let layout = Layout::new(&root);
        let (tx, asset_rx) = mpsc::channel(16);
        let (coord_tx, rx) = mpsc::channel(16);
        let shutdown = Shutdown::new();
        let builder = AssetBuilder::new(&layout, 35729, asset_rx, coord_tx, shutdown.clone());
        tokio::spawn(builder.run());
        Harness {
            _temp: temp,
            root,
            layout,
            tx,
            rx,
            shutdown,
        }
    }

    async fn scan(h: &mut Harness, files: &[&str]) {
        for path in files {
            h.ingest(path, FileEventKind::Create).await;
        }
        h.tx.send(AssetMsg::ScanComplete).await.unwrap();
        assert_eq!(h.emitted().await, (MediaType::Css, true, EmitCause::Source));
        assert_eq!(h.emitted().await, (MediaType::Js, true, EmitCause::Source));
    }

    #[tokio::test]
    async fn test_initial_bundles_in_scan_order() {
        let mut h = spawn(&[
            ("web/a.css", ".a { color: red; }"),
            ("web/b.css", ".b { margin: 0; }"),
            ("web/app.js", "console.log(\"app-marker\");"),
        ])
        .await;
        scan(&mut h, &["web/a.css", "web/b.css", "web/app.js"]).await;

        let css = h.read(MediaType::Css);
        assert!(css.find(".a").unwrap() < css.find(".b").unwrap());
        let js = h.read(MediaType::Js);
        assert!(js.contains("app-marker"));
        assert!(js.contains("/client.wasm"));
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn test_create_is_idempotent_and_silent() {
        let mut h = spawn(&[("web/a.css", ".a{color:red}")]).await;
        scan(&mut h, &["web/a.css"]).await;

        // A second create for a known path and a create of a new empty file
        // both leave the written bundle alone.
        h.ingest("web/a.css", FileEventKind::Create).await;
        write(&h.root, "web/new.css", "");
        h.ingest("web/new.css", FileEventKind::Create).await;
        h.quiet().await;

        write(&h.root, "web/new.css", ".n{margin:0}");
        h.ingest("web/new.css", FileEventKind::Write).await;
        assert_eq!(h.emitted().await, (MediaType::Css, true, EmitCause::Source));
        let css = h.read(MediaType::Css);
        assert!(css.find(".a").unwrap() < css.find(".n").unwrap());
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn test_remove_drops_content() {
        let mut h = spawn(&[("web/a.css", ".a{color:red}"), ("web/b.css", ".b{color:blue}")]).await;
        scan(&mut h, &["web/a.css", "web/b.css"]).await;

        std::fs::remove_file(h.root.join("web/a.css")).unwrap();
        h.ingest("web/a.css", FileEventKind::Remove).await;
        assert_eq!(h.emitted().await, (MediaType::Css, true, EmitCause::Source));
        let css = h.read(MediaType::Css);
        assert!(!css.contains(".a"));
        assert!(css.contains(".b"));

        // Unknown path: nothing to emit.
        h.ingest("web/zzz.css", FileEventKind::RenameOut).await;
        h.quiet().await;
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn test_parse_error_keeps_previous_bundle() {
        let mut h = spawn(&[("web/app.js", "var ok = 1;")]).await;
        scan(&mut h, &["web/app.js"]).await;
        let before = h.read(MediaType::Js);

        write(&h.root, "web/app.js", "function (");
        h.ingest("web/app.js", FileEventKind::Write).await;
        assert_eq!(h.emitted().await, (MediaType::Js, false, EmitCause::Source));
        assert_eq!(h.read(MediaType::Js), before);
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn test_loader_adopted_only_on_success() {
        let mut h = spawn(&[("web/app.js", "var ok = 1;")]).await;
        h.tx.send(AssetMsg::SetLoader("var loaderOne = 1;".into())).await.unwrap();
        scan(&mut h, &["web/app.js"]).await;
        assert!(h.read(MediaType::Js).contains("loaderOne"));

        // Broken candidate: emission fails, the old loader stays.
        h.tx.send(AssetMsg::Refresh {
            media: MediaType::Js,
            loader: Some("function (".into()),
            cause: EmitCause::Txn(TxnId(1)),
        })
        .await
        .unwrap();
        assert_eq!(h.emitted().await, (MediaType::Js, false, EmitCause::Txn(TxnId(1))));
        assert!(h.read(MediaType::Js).contains("loaderOne"));

        h.tx.send(AssetMsg::Refresh {
            media: MediaType::Js,
            loader: Some("var loaderTwo = 2;".into()),
            cause: EmitCause::Txn(TxnId(2)),
        })
        .await
        .unwrap();
        assert_eq!(h.emitted().await, (MediaType::Js, true, EmitCause::Txn(TxnId(2))));
        let js = h.read(MediaType::Js);
        assert!(js.contains("loaderTwo") && !js.contains("loaderOne"));

        // Source edits keep the adopted loader.
        write(&h.root, "web/app.js", "var edited = 2;");
        h.ingest("web/app.js", FileEventKind::Write).await;
        assert_eq!(h.emitted().await, (MediaType::Js, true, EmitCause::Source));
        assert!(h.read(MediaType::Js).contains("loaderTwo"));
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn test_nothing_written_before_scan() {
        let mut h = spawn(&[("web/a.css", ".a{}")]).await;
        h.ingest("web/a.css", FileEventKind::Write).await;
        h.quiet().await;
        assert!(!h.layout.bundle_path(MediaType::Css).exists());
        h.shutdown.trigger();
    }
}
