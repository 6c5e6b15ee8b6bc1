#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdcapture::filing::NoteWriter;
use mdcapture::placeholder::FixedClock;
use mdcapture::store::SettingsStore;
use mdcapture::template::SaveTemplate;
use tempfile::TempDir;

/// A temporary directory holding a `notes/` folder for saved notes.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Sandbox {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("notes")).unwrap();
        Sandbox { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn notes(&self) -> PathBuf {
        self.dir.path().join("notes")
    }

    /// Every file in `notes/`, sorted by name.
    pub fn note_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.notes())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    /// A template with default settings pointing at `notes/`.
    pub fn template(&self) -> SaveTemplate {
        let mut t = SaveTemplate::new("test");
        t.folder_uri = self.notes().display().to_string();
        t
    }

    pub fn store(&self) -> SettingsStore {
        SettingsStore::open(self.root()).unwrap()
    }
}

pub fn clock(rfc3339: &str) -> Arc<FixedClock> {
    Arc::new(FixedClock::at(rfc3339).unwrap())
}

pub fn writer_at(rfc3339: &str) -> (NoteWriter, Arc<FixedClock>) {
    let clock = clock(rfc3339);
    (NoteWriter::new(clock.clone()), clock)
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
