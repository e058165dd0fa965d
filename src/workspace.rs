//! Workspace mode: every `.np` file under a root directory is tracked.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tower_lsp::lsp_types::{FileChangeType, FileEvent, Url};
use walkdir::WalkDir;

use crate::services::{Services, ServicesMode};

pub const PACKAGE_EXTENSION: &str = "np";

pub fn is_package_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == PACKAGE_EXTENSION)
}

/// Package files under `root`, sorted.
pub fn find_package_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && is_package_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Creates workspace services with every package under `root` loaded.
/// Files that cannot be read are skipped.
pub fn load_workspace(root: &Path) -> anyhow::Result<Services> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root {} is not accessible", root.display()))?;
    let files = find_package_files(&root);
    tracing::info!("Loading {} Nevod packages from {}", files.len(), root.display());

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match read_package(&path) {
            Ok(document) => documents.push(document),
            Err(e) => tracing::warn!("Failed to load {:?}: {:#}", path, e),
        }
    }
    let mut services = Services::new(ServicesMode::Workspace { root });
    services.load_documents(documents);
    Ok(services)
}

fn read_package(path: &Path) -> anyhow::Result<(Url, String)> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let uri = Url::from_file_path(path).map_err(|_| anyhow::anyhow!("{} is not an absolute path", path.display()))?;
    Ok((uri, text))
}

/// Applies file system events reported by the client. Created and changed
/// packages are reloaded from disk unless the client has them open.
pub fn apply_file_events(services: &mut Services, events: &[FileEvent], open_in_editor: &dyn Fn(&Url) -> bool) {
    for event in events {
        let Ok(path) = event.uri.to_file_path() else {
            continue;
        };
        if !is_package_file(&path) {
            continue;
        }
        match event.typ {
            FileChangeType::DELETED => services.delete_document(&event.uri),
            FileChangeType::CREATED | FileChangeType::CHANGED => {
                if open_in_editor(&event.uri) {
                    continue;
                }
                match read_package(&path) {
                    Ok((uri, text)) => services.open_document(uri, text),
                    Err(e) => tracing::warn!("Failed to reload {:?}: {:#}", path, e),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_find_package_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.np", "B = Word;");
        write(dir.path(), "nested/a.np", "A = Word;");
        write(dir.path(), "notes.txt", "not a package");

        let files = find_package_files(dir.path());

        assert_eq!(files, vec![dir.path().join("b.np"), dir.path().join("nested/a.np")]);
    }

    #[test]
    fn test_load_workspace_tracks_all_packages() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Main.np", "@require 'lib/Basic.np';\nP = Digit;");
        write(dir.path(), "lib/Basic.np", "Digit = Num;");

        let mut services = load_workspace(dir.path()).unwrap();

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(services.mode(), &ServicesMode::Workspace { root: root.clone() });
        let main = Url::from_file_path(root.join("Main.np")).unwrap();
        let basic = Url::from_file_path(root.join("lib/Basic.np")).unwrap();
        assert_eq!(services.tracked_documents(), vec![main.clone(), basic.clone()]);
        let symbols = services.document_symbols(&basic).unwrap();
        assert_eq!(symbols[0].name, "Digit");
    }

    #[test]
    fn test_load_workspace_with_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_workspace(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_file_events() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Main.np", "P = Word;");
        let mut services = load_workspace(dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let main = Url::from_file_path(root.join("Main.np")).unwrap();
        let added = Url::from_file_path(write(&root, "Added.np", "Q = Num;")).unwrap();
        write(&root, "Main.np", "P = Word;\nR = P;");

        let events = vec![
            FileEvent::new(added.clone(), FileChangeType::CREATED),
            FileEvent::new(main.clone(), FileChangeType::CHANGED),
        ];
        apply_file_events(&mut services, &events, &|_: &Url| false);
        assert_eq!(services.tracked_documents(), vec![added.clone(), main.clone()]);
        assert_eq!(services.document(&main).unwrap().text(), "P = Word;\nR = P;");

        write(&root, "Main.np", "P = Num;");
        apply_file_events(
            &mut services,
            &[FileEvent::new(main.clone(), FileChangeType::CHANGED)],
            &|uri: &Url| uri == &main,
        );
        assert_eq!(services.document(&main).unwrap().text(), "P = Word;\nR = P;");

        apply_file_events(&mut services, &[FileEvent::new(added.clone(), FileChangeType::DELETED)], &|_: &Url| false);
        assert_eq!(services.tracked_documents(), vec![main]);
    }
}
