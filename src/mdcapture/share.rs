//! Content handed over by other programs: text goes through the note
//! pipeline, other files are copied into the template's folder.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::SaveError;
use crate::filing::{read_text, NoteWriter, SaveOutcome};
use crate::template::SaveTemplate;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shared {
    Text(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Note(SaveOutcome),
    File(PathBuf),
}

impl ShareOutcome {
    pub fn message(&self) -> String {
        match self {
            ShareOutcome::Note(outcome) => outcome.message(),
            ShareOutcome::File(path) => format!("file saved to {}", path.display()),
        }
    }
}

/// File shared items using `template`. Text files are read and filed as notes.
pub fn share(writer: &NoteWriter, template: &SaveTemplate, item: Shared) -> Result<ShareOutcome, SaveError> {
    let plan = template.resolve();
    match item {
        Shared::Text(text) => writer.save(&text, &plan).map(ShareOutcome::Note),
        Shared::File(path) if is_text_file(&path) => {
            debug!(path = %path.display(), "shared file is text, filing as a note");
            let text = read_text(&path)
                .map_err(|source| SaveError::WriteFailed { path: path.clone(), source })?;
            writer.save(&text, &plan).map(ShareOutcome::Note)
        }
        Shared::File(path) => writer
            .store_file(&path, plan.folder.as_deref())
            .map(ShareOutcome::File),
    }
}

/// Share several items at once; one result per item, in order. A failure
/// does not stop the remaining items.
pub fn share_all<I>(writer: &NoteWriter, template: &SaveTemplate, items: I) -> Vec<Result<ShareOutcome, SaveError>>
where
    I: IntoIterator<Item = Shared>,
{
    items
        .into_iter()
        .map(|item| share(writer, template, item))
        .collect()
}

pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
