use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Serialize, Deserialize};

use crate::errors::Result;
use crate::utils::format_field;

pub const DEFAULT_NOTE_DATE_TEMPLATE: &str = "{{yyyy.MM.dd HH_mm_ss}}";
pub const DEFAULT_TIMESTAMP_TEMPLATE: &str = "# {{yyyy.MM.dd HH:mm:ss}}";
pub const DEFAULT_PROPERTY_NAME: &str = "created";
pub const DEFAULT_DATE_CREATED_TEMPLATE: &str = "{{yyyy.MM.dd}}T{{HH:mm:ssZ}}";
pub const DEFAULT_EXCERPT_LENGTH: usize = 30;
pub const MAX_INDENT_LEVEL: u8 = 5;

/// A named bundle of save-formatting settings.
///
/// Field names on disk keep the camelCase spelling of the stored JSON list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveTemplate {
    pub id: String,
    pub name: String,
    pub folder_uri: String,
    pub note_date_template: String,
    pub is_list_items_enabled: bool,
    pub list_item_indent_level: u8,
    pub is_timestamp_enabled: bool,
    pub timestamp_template: String,
    pub is_date_created_enabled: bool,
    pub property_name: String,
    pub date_created_template: String,
    pub is_note_text_in_filename_enabled: bool,
    pub note_text_in_filename_length: usize,
    /// Only read when migrating lists written before the default id existed.
    #[serde(rename = "isDefault", skip_serializing)]
    pub legacy_default: bool,
}

impl Default for SaveTemplate {
    fn default() -> Self {
        SaveTemplate {
            id: String::new(),
            name: String::new(),
            folder_uri: String::new(),
            note_date_template: DEFAULT_NOTE_DATE_TEMPLATE.to_string(),
            is_list_items_enabled: false,
            list_item_indent_level: 0,
            is_timestamp_enabled: false,
            timestamp_template: DEFAULT_TIMESTAMP_TEMPLATE.to_string(),
            is_date_created_enabled: false,
            property_name: DEFAULT_PROPERTY_NAME.to_string(),
            date_created_template: DEFAULT_DATE_CREATED_TEMPLATE.to_string(),
            is_note_text_in_filename_enabled: false,
            note_text_in_filename_length: DEFAULT_EXCERPT_LENGTH,
            legacy_default: false,
        }
    }
}

/// YAML front-matter written at the top of a new note.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontMatter {
    pub property: String,
    pub value_template: String,
}

/// How a note body is shaped before it is written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteFormat {
    /// Tab depth for "- " list items, `None` when list items are off.
    pub list_indent: Option<u8>,
    /// Timestamp line template, `None` when the timestamp is off.
    pub timestamp: Option<String>,
    pub front_matter: Option<FrontMatter>,
}

/// How the target filename is derived.
#[derive(Clone, Debug, PartialEq)]
pub struct FilenameRule {
    pub date_template: String,
    /// Number of note characters appended after " - ", if enabled.
    pub excerpt_len: Option<usize>,
}

/// Everything the save pipeline needs, resolved from one template.
#[derive(Clone, Debug, PartialEq)]
pub struct SavePlan {
    pub folder: Option<PathBuf>,
    pub filename: FilenameRule,
    pub format: NoteFormat,
}

impl SaveTemplate {
    /// A fresh template with default settings and a new id.
    pub fn new(name: &str) -> SaveTemplate {
        SaveTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.replace('\n', " ").trim().to_string(),
            ..Default::default()
        }
    }

    /// Clamp fields into their valid ranges.
    pub fn normalize(&mut self) {
        if self.list_item_indent_level > MAX_INDENT_LEVEL {
            self.list_item_indent_level = MAX_INDENT_LEVEL;
        }
        if self.property_name.trim().is_empty() {
            self.property_name = DEFAULT_PROPERTY_NAME.to_string();
        }
    }

    /// Turn the flags of this template into concrete formatting decisions.
    pub fn resolve(&self) -> SavePlan {
        let folder = if self.folder_uri.trim().is_empty() {
            None
        } else {
            Some(folder_path(self.folder_uri.trim()))
        };
        SavePlan {
            folder,
            filename: FilenameRule {
                date_template: self.note_date_template.clone(),
                excerpt_len: if self.is_note_text_in_filename_enabled {
                    Some(self.note_text_in_filename_length)
                } else {
                    None
                },
            },
            format: NoteFormat {
                list_indent: if self.is_list_items_enabled {
                    Some(self.list_item_indent_level.min(MAX_INDENT_LEVEL))
                } else {
                    None
                },
                timestamp: if self.is_timestamp_enabled {
                    Some(self.timestamp_template.clone())
                } else {
                    None
                },
                front_matter: if self.is_date_created_enabled {
                    Some(FrontMatter {
                        property: self.property_name.clone(),
                        value_template: self.date_created_template.clone(),
                    })
                } else {
                    None
                },
            },
        }
    }

    /// write the template as one line of a listing
    pub fn write_line<T: Write>(&self, output: &mut T, is_default: bool, is_selected: bool) -> Result<()> {
        let marker = match (is_default, is_selected) {
            (true, true) => "*>",
            (true, false) => "* ",
            (false, true) => " >",
            (false, false) => "  ",
        };
        let folder = if self.folder_uri.is_empty() { "(no folder)" } else { self.folder_uri.as_str() };
        writeln!(output,
                 "{} {}  {}  {}",
                 marker,
                 format_field(&self.id, 8, false),
                 format_field(&self.name, 20, true),
                 folder)?;
        Ok(())
    }

    pub fn print_line(&self, is_default: bool, is_selected: bool) -> Result<()> {
        self.write_line(&mut io::stdout(), is_default, is_selected)
    }
}

impl fmt::Display for SaveTemplate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "id: {}", self.id)?;
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "folder: {}", if self.folder_uri.is_empty() { "(none)" } else { self.folder_uri.as_str() })?;
        writeln!(f, "filename: {}", self.note_date_template)?;
        writeln!(f, "list items: {} (indent {})", on_off(self.is_list_items_enabled), self.list_item_indent_level)?;
        writeln!(f, "timestamp: {} ({})", on_off(self.is_timestamp_enabled), self.timestamp_template)?;
        writeln!(f, "date created: {} ({}: {})",
                 on_off(self.is_date_created_enabled),
                 self.property_name,
                 self.date_created_template)?;
        write!(f, "note text in filename: {} ({} chars)",
               on_off(self.is_note_text_in_filename_enabled),
               self.note_text_in_filename_length)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// Folder references may be plain paths or `file://` URIs.
pub fn folder_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_reflects_flags() {
        let mut t = SaveTemplate::new("Journal");
        t.folder_uri = "file:///tmp/notes".to_string();
        t.is_list_items_enabled = true;
        t.list_item_indent_level = 2;
        t.is_date_created_enabled = true;

        let plan = t.resolve();
        assert_eq!(plan.folder, Some(PathBuf::from("/tmp/notes")));
        assert_eq!(plan.format.list_indent, Some(2));
        assert_eq!(plan.format.timestamp, None);
        assert_eq!(plan.format.front_matter,
                   Some(FrontMatter {
                       property: "created".to_string(),
                       value_template: DEFAULT_DATE_CREATED_TEMPLATE.to_string(),
                   }));
        assert_eq!(plan.filename.excerpt_len, None);
    }

    #[test]
    fn blank_folder_resolves_to_none() {
        let t = SaveTemplate::new("x");
        assert_eq!(t.resolve().folder, None);
    }

    #[test]
    fn normalize_clamps_indent() {
        let mut t = SaveTemplate::new("x");
        t.list_item_indent_level = 9;
        t.property_name = "  ".to_string();
        t.normalize();
        assert_eq!(t.list_item_indent_level, MAX_INDENT_LEVEL);
        assert_eq!(t.property_name, "created");
    }

    #[test]
    fn json_uses_camel_case_and_drops_legacy_flag() {
        let mut t = SaveTemplate::new("x");
        t.legacy_default = true;
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"noteDateTemplate\""));
        assert!(!json.contains("isDefault"));

        let back: SaveTemplate = serde_json::from_str(
            r#"{"id":"a","name":"Old","isDefault":true,"listItemIndentLevel":1}"#).unwrap();
        assert!(back.legacy_default);
        assert_eq!(back.list_item_indent_level, 1);
        assert_eq!(back.timestamp_template, DEFAULT_TIMESTAMP_TEMPLATE);
    }
}
