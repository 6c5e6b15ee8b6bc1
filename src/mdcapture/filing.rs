//! Creating and appending Markdown notes in a template's folder.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::SaveError;
use crate::formatter::format_note;
use crate::placeholder::{expand_filename, Clock};
use crate::template::{FilenameRule, SavePlan};

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static PATH_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\\]").unwrap());
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f]").unwrap());

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    /// `true` when the file was created, `false` when the note was appended.
    pub created: bool,
}

impl SaveOutcome {
    pub fn message(&self) -> String {
        if self.created {
            format!("note saved to {}", self.path.display())
        } else {
            format!("note appended to {}", self.path.display())
        }
    }
}

/// Files notes into folders, one writer at a time per target file.
pub struct NoteWriter {
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl NoteWriter {
    pub fn new(clock: Arc<dyn Clock>) -> NoteWriter {
        NoteWriter {
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Save `note` according to `plan`, creating the file or appending to it.
    ///
    /// The clock is read once; filename, timestamp and front-matter all use
    /// that instant.
    pub fn save(&self, note: &str, plan: &SavePlan) -> Result<SaveOutcome, SaveError> {
        if note.trim().is_empty() {
            return Err(SaveError::EmptyNote);
        }
        let folder = plan.folder.as_deref().ok_or(SaveError::FolderNotSelected)?;
        check_folder(folder)?;

        let at = self.clock.now();
        let path = folder.join(note_filename(&plan.filename, note, &at));
        let lock = self.lock_for(&path);
        let written = {
            let _guard = match lock.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            write_note(&path, note, plan, &at)
        };
        self.release(&path, lock);

        let created = written.map_err(|source| SaveError::WriteFailed { path: path.clone(), source })?;
        info!(path = %path.display(), created, "note filed");
        Ok(SaveOutcome { path, created })
    }

    /// Copy a shared file into `folder`, keeping its name and adding a
    /// ` (n)` suffix if that name is taken.
    pub fn store_file(&self, source: &Path, folder: Option<&Path>) -> Result<PathBuf, SaveError> {
        let folder = folder.ok_or(SaveError::FolderNotSelected)?;
        check_folder(folder)?;

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("shared_file_{}", self.clock.now().timestamp_millis()));

        let mut input = File::open(source)
            .map_err(|e| SaveError::WriteFailed { path: source.to_path_buf(), source: e })?;

        let (dest, mut output) = create_unique(folder, &name)
            .map_err(|e| SaveError::WriteFailed { path: folder.join(&name), source: e })?;
        let copied = io::copy(&mut input, &mut output).and_then(|n| output.flush().map(|_| n));
        match copied {
            Ok(bytes) => {
                info!(path = %dest.display(), bytes, "shared file stored");
                Ok(dest)
            }
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "copy failed, removing partial file");
                let _ = fs::remove_file(&dest);
                Err(SaveError::WriteFailed { path: dest, source: e })
            }
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    // Drop the map entry once nobody else is waiting on it.
    fn release(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        // one reference in the map, one here; drop ours while the map is
        // still locked so a concurrent release sees the final count
        let last = Arc::strong_count(&lock) == 2;
        drop(lock);
        if last {
            locks.remove(path);
        }
    }
}

/// The folder must exist, be a directory, not be read-only and accept a
/// new file from this process.
pub fn check_folder(folder: &Path) -> Result<(), SaveError> {
    let unwritable = || SaveError::FolderUnwritable(folder.to_path_buf());
    match fs::metadata(folder) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {}
        Ok(_) => return Err(unwritable()),
        Err(e) => {
            debug!(folder = %folder.display(), error = %e, "folder check failed");
            return Err(unwritable());
        }
    }
    // ownership, ACLs and read-only mounts only show up on an actual write
    match tempfile::tempfile_in(folder) {
        Ok(_) => Ok(()),
        Err(e) => {
            debug!(folder = %folder.display(), error = %e, "folder is not writable");
            Err(unwritable())
        }
    }
}

/// Expand the date template, optionally add " - <excerpt>", end with `.md`.
pub fn note_filename(rule: &FilenameRule, note: &str, at: &DateTime<FixedOffset>) -> String {
    let mut filename = PATH_SEPARATORS
        .replace_all(&expand_filename(&rule.date_template, at), "_")
        .into_owned();
    if let Some(len) = rule.excerpt_len {
        let excerpt = filename_excerpt(note, len);
        if !excerpt.is_empty() {
            filename.push_str(" - ");
            filename.push_str(&excerpt);
        }
    }
    filename.push_str(".md");
    filename
}

/// First `len` characters of the note, made safe for a filename.
pub fn filename_excerpt(note: &str, len: usize) -> String {
    let head: String = note.chars().take(len).collect();
    let safe = UNSAFE_FILENAME_CHARS.replace_all(&head, "_");
    CONTROL_CHARS.replace_all(&safe, " ").trim().to_string()
}

// Returns whether the file was created.
fn write_note(path: &Path, note: &str, plan: &SavePlan, at: &DateTime<FixedOffset>) -> io::Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let content = format_note(note, &plan.format, true, at);
            write_created(path, &mut file, &content)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let mut file = OpenOptions::new().append(true).open(path)?;
            let content = format_note(note, &plan.format, false, at);
            file.write_all(content.as_bytes())?;
            file.flush()?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

// A half-written new note would be appended to next time and never get
// its front-matter, so remove it on failure.
fn write_created<W: Write>(path: &Path, out: &mut W, content: &str) -> io::Result<()> {
    let written = out.write_all(content.as_bytes()).and_then(|_| out.flush());
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "write failed, removing new note");
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn create_unique(folder: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 0u32;
    loop {
        let candidate = if n == 0 {
            folder.join(name)
        } else {
            folder.join(format!("{} ({}){}", stem, n, ext))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Read a whole file as text, used for shared `text/*` files.
pub fn read_text(path: &Path) -> io::Result<String> {
    let mut buf = String::new();
    File::open(path)?.read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-02T03:04:05+00:00").unwrap()
    }

    fn rule(template: &str, excerpt_len: Option<usize>) -> FilenameRule {
        FilenameRule { date_template: template.to_string(), excerpt_len }
    }

    #[test]
    fn filename_replaces_colons_and_adds_one_suffix() {
        let name = note_filename(&rule("{{HH:mm}} at: {{yyyy}}", None), "x", &at());
        assert_eq!(name, "03_04 at_ 2024.md");
        let name = note_filename(&rule("notes.md", None), "x", &at());
        assert_eq!(name, "notes.md.md");
    }

    #[test]
    fn excerpt_is_truncated_and_sanitized() {
        assert_eq!(filename_excerpt("a<b>c:d\"e/f\\g|h?i*j", 100), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(filename_excerpt("  hello world  ", 7), "hello");
        assert_eq!(filename_excerpt("line one\nline two", 12), "line one lin");
        assert_eq!(filename_excerpt("привет мир", 6), "привет");
    }

    #[test]
    fn blank_excerpt_is_omitted() {
        let name = note_filename(&rule("{{yyyy}}", Some(3)), "   text", &at());
        assert_eq!(name, "2024.md");
        let name = note_filename(&rule("{{yyyy}}", Some(4)), "Buy milk", &at());
        assert_eq!(name, "2024 - Buy.md");
    }

    #[test]
    fn missing_folder_is_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(check_folder(&missing), Err(SaveError::FolderUnwritable(_))));
        assert!(check_folder(dir.path()).is_ok());
    }

    #[test]
    fn path_separators_stay_inside_the_folder() {
        let name = note_filename(&rule("{{yyyy/MM/dd}}", None), "x", &at());
        assert_eq!(name, "2024_01_02.md");
        let name = note_filename(&rule("../{{yyyy}}\\x", None), "x", &at());
        assert_eq!(name, ".._2024_x.md");
    }

    struct BrokenDisk;

    impl Write for BrokenDisk {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_new_note_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        File::create(&path).unwrap();

        assert!(write_created(&path, &mut BrokenDisk, "---\ncreated: x\n---\nhi").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn lock_table_does_not_grow() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(crate::placeholder::FixedClock::new(at()));
        let writer = NoteWriter::new(clock.clone());
        let mut template = crate::template::SaveTemplate::new("t");
        template.folder_uri = dir.path().display().to_string();

        for second in 0..5 {
            clock.set(at() + chrono::Duration::seconds(second));
            writer.save("note", &template.resolve()).unwrap();
        }
        assert_eq!(dir.path().read_dir().unwrap().count(), 5);
        assert!(writer.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn read_only_bits_make_a_folder_unwritable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
        let checked = check_folder(dir.path());
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(checked, Err(SaveError::FolderUnwritable(_))));
    }

    #[test]
    fn unique_names_get_a_counter() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_unique(dir.path(), "pic.png").unwrap();
        let (second, _) = create_unique(dir.path(), "pic.png").unwrap();
        let (third, _) = create_unique(dir.path(), "pic.png").unwrap();
        assert_eq!(first.file_name().unwrap(), "pic.png");
        assert_eq!(second.file_name().unwrap(), "pic (1).png");
        assert_eq!(third.file_name().unwrap(), "pic (2).png");
    }
}
