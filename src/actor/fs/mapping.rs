//! notify event → `(path, FileEventKind)` pairs.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

use crate::core::FileEventKind;

/// Translate one raw notify event.
///
/// Metadata-only changes (mtime/atime/chmod noise) are dropped. Renames of
/// unknown direction are resolved by whether the path still exists.
pub(super) fn map_event(event: &notify::Event) -> Vec<(PathBuf, FileEventKind)> {
    let paths = &event.paths;
    let all = |kind: FileEventKind| -> Vec<(PathBuf, FileEventKind)> {
        paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => all(FileEventKind::Create),
        EventKind::Remove(_) => all(FileEventKind::Remove),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(FileEventKind::RenameOut),
            RenameMode::To => all(FileEventKind::RenameIn),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(2);
                if let Some(from) = paths.first() {
                    out.push((from.clone(), FileEventKind::RenameOut));
                }
                if let Some(to) = paths.get(1) {
                    out.push((to.clone(), FileEventKind::RenameIn));
                }
                out
            }
            RenameMode::Any | RenameMode::Other => paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        FileEventKind::RenameIn
                    } else {
                        FileEventKind::RenameOut
                    };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => all(FileEventKind::Write),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
