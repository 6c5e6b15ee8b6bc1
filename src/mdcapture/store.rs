// std lib imports
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_yaml::Value;
use tokio::sync::watch;
use tracing::{debug, info};

// mdcapture imports
use crate::errors::Result;
use crate::reminder::ReminderSchedule;
use crate::template::SaveTemplate;
use crate::{specific_fail, specific_fail_str};

pub const PREFERENCES_FILE: &str = "preferences.yaml";

pub const KEY_TEMPLATES: &str = "TEMPLATES";
pub const KEY_DEFAULT_TEMPLATE_ID: &str = "DEFAULT_TEMPLATE_ID";
pub const KEY_SELECTED_TEMPLATE_ID: &str = "SELECTED_TEMPLATE_ID";
pub const KEY_REMINDER_TEMPLATE_ID: &str = "REMINDER_TEMPLATE_ID";
pub const KEY_REMINDER_ENABLED: &str = "REMINDER_ENABLED";
pub const KEY_REMINDER_TEXT: &str = "REMINDER_TEXT";
pub const KEY_REMINDER_INTERVAL: &str = "REMINDER_INTERVAL";
pub const KEY_REMINDER_START_TIME: &str = "REMINDER_START_TIME";
pub const KEY_REMINDER_END_TIME: &str = "REMINDER_END_TIME";
pub const KEY_REMINDER_LAST_FIRED: &str = "REMINDER_LAST_FIRED";
pub const KEY_NOTIFY_COMMAND: &str = "NOTIFY_COMMAND";
pub const KEY_DRAFT_TEXT: &str = "DRAFT_TEXT";

/// minute resolution used for the last-fired marker
pub static LAST_FIRED_FMT: &str = "%Y-%m-%dT%H:%M";

pub const DEFAULT_TEMPLATE_NAME: &str = "Default";

/// Flat key-value preferences, stored as a YAML mapping of scalars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    values: BTreeMap<String, Value>,
}

impl Preferences {
    /// Read preferences from `path`; a missing file yields empty preferences.
    pub fn load(path: &Path) -> Result<Preferences> {
        if !path.exists() {
            return Ok(Preferences::default());
        }
        if !path.is_file() {
            return specific_fail!(format!("{} is not a file.", path.display()));
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Preferences::default());
        }
        let values: BTreeMap<String, Value> = match serde_yaml::from_str(&contents) {
            Ok(v) => v,
            Err(e) => return specific_fail!(format!("invalid YAML in {}: {}", path.display(), e)),
        };
        Ok(Preferences { values })
    }

    /// Write through a temp file in the same folder, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let folder = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let yaml = serde_yaml::to_string(&self.values)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".preferences")
            .suffix(".yaml")
            .tempfile_in(&folder)?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path)?;
        Ok(())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn put_str(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn put_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
    }

    pub fn put_u32(&mut self, key: &str, value: u32) {
        self.values.insert(key.to_string(), Value::Number(value.into()));
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// A read-only view of every setting the save and reminder paths use.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub templates: Vec<SaveTemplate>,
    pub default_template_id: String,
    pub selected_template_id: String,
    pub reminder_template_id: Option<String>,
    pub reminder: ReminderSchedule,
    pub notify_command: Option<String>,
}

impl Settings {
    pub fn template(&self, id: &str) -> Option<&SaveTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn default_template(&self) -> Result<&SaveTemplate> {
        match self.template(&self.default_template_id).or_else(|| self.templates.first()) {
            Some(t) => Ok(t),
            None => specific_fail_str!("no templates configured"),
        }
    }

    /// The selected template, falling back to the default.
    pub fn selected_template(&self) -> Result<&SaveTemplate> {
        match self.template(&self.selected_template_id) {
            Some(t) => Ok(t),
            None => self.default_template(),
        }
    }

    /// The template for notes captured from a reminder, falling back to the default.
    pub fn reminder_template(&self) -> Result<&SaveTemplate> {
        match self.reminder_template_id.as_deref().and_then(|id| self.template(id)) {
            Some(t) => Ok(t),
            None => self.default_template(),
        }
    }

    /// Look a template up by exact id, case-insensitive name, or unique id prefix.
    pub fn find(&self, key: &str) -> Result<&SaveTemplate> {
        if let Some(t) = self.template(key) {
            return Ok(t);
        }
        let by_name: Vec<&SaveTemplate> = self.templates
            .iter()
            .filter(|t| t.name.eq_ignore_ascii_case(key))
            .collect();
        match by_name.len() {
            1 => return Ok(by_name[0]),
            0 => {}
            _ => return specific_fail!(format!("template name '{}' is ambiguous, use its id", key)),
        }
        let by_prefix: Vec<&SaveTemplate> = self.templates
            .iter()
            .filter(|t| !key.is_empty() && t.id.starts_with(key))
            .collect();
        match by_prefix.len() {
            1 => Ok(by_prefix[0]),
            0 => specific_fail!(format!("template '{}' doesn't exist", key)),
            _ => specific_fail!(format!("template id prefix '{}' is ambiguous", key)),
        }
    }

    fn from_preferences(prefs: &Preferences) -> Result<(Settings, bool)> {
        let mut dirty = false;
        let mut templates: Vec<SaveTemplate> = match prefs.get_str(KEY_TEMPLATES) {
            Some(json) => serde_json::from_str(json)?,
            None => vec![],
        };
        for t in templates.iter_mut() {
            if t.id.is_empty() {
                t.id = uuid::Uuid::new_v4().to_string();
                dirty = true;
            }
            t.normalize();
        }
        if templates.is_empty() {
            info!("no templates stored, creating '{}'", DEFAULT_TEMPLATE_NAME);
            templates.push(SaveTemplate::new(DEFAULT_TEMPLATE_NAME));
            dirty = true;
        }

        let stored_default = prefs
            .get_str(KEY_DEFAULT_TEMPLATE_ID)
            .filter(|id| templates.iter().any(|t| t.id.as_str() == *id))
            .map(str::to_string);
        let default_template_id = match stored_default {
            Some(id) => id,
            None => {
                dirty = true;
                templates
                    .iter()
                    .find(|t| t.legacy_default)
                    .unwrap_or(&templates[0])
                    .id
                    .clone()
            }
        };
        for t in templates.iter_mut() {
            if t.legacy_default {
                t.legacy_default = false;
                dirty = true;
            }
        }

        let selected_template_id = prefs
            .get_str(KEY_SELECTED_TEMPLATE_ID)
            .filter(|id| templates.iter().any(|t| t.id.as_str() == *id))
            .map(str::to_string)
            .unwrap_or_else(|| default_template_id.clone());
        let reminder_template_id = prefs
            .get_str(KEY_REMINDER_TEMPLATE_ID)
            .filter(|id| templates.iter().any(|t| t.id.as_str() == *id))
            .map(str::to_string);

        let defaults = ReminderSchedule::default();
        let reminder = ReminderSchedule {
            enabled: prefs.get_bool(KEY_REMINDER_ENABLED).unwrap_or(defaults.enabled),
            text: prefs.get_str(KEY_REMINDER_TEXT).map(str::to_string).unwrap_or(defaults.text),
            interval_minutes: prefs.get_u32(KEY_REMINDER_INTERVAL).unwrap_or(defaults.interval_minutes),
            start_time: prefs
                .get_str(KEY_REMINDER_START_TIME)
                .map(str::to_string)
                .unwrap_or(defaults.start_time),
            end_time: prefs
                .get_str(KEY_REMINDER_END_TIME)
                .map(str::to_string)
                .unwrap_or(defaults.end_time),
        };

        let settings = Settings {
            templates,
            default_template_id,
            selected_template_id,
            reminder_template_id,
            reminder,
            notify_command: prefs.get_str(KEY_NOTIFY_COMMAND).map(str::to_string),
        };
        Ok((settings, dirty))
    }

    fn write_to(&self, prefs: &mut Preferences) -> Result<()> {
        prefs.put_str(KEY_TEMPLATES, &serde_json::to_string(&self.templates)?);
        prefs.put_str(KEY_DEFAULT_TEMPLATE_ID, &self.default_template_id);
        prefs.put_str(KEY_SELECTED_TEMPLATE_ID, &self.selected_template_id);
        match &self.reminder_template_id {
            Some(id) => prefs.put_str(KEY_REMINDER_TEMPLATE_ID, id),
            None => prefs.remove(KEY_REMINDER_TEMPLATE_ID),
        }
        prefs.put_bool(KEY_REMINDER_ENABLED, self.reminder.enabled);
        prefs.put_str(KEY_REMINDER_TEXT, &self.reminder.text);
        prefs.put_u32(KEY_REMINDER_INTERVAL, self.reminder.interval_minutes);
        prefs.put_str(KEY_REMINDER_START_TIME, &self.reminder.start_time);
        prefs.put_str(KEY_REMINDER_END_TIME, &self.reminder.end_time);
        match &self.notify_command {
            Some(cmd) => prefs.put_str(KEY_NOTIFY_COMMAND, cmd),
            None => prefs.remove(KEY_NOTIFY_COMMAND),
        }
        Ok(())
    }
}

/// Durable settings with change notifications.
///
/// Every mutation is written to disk before subscribers see the new snapshot.
pub struct SettingsStore {
    path: PathBuf,
    prefs: Preferences,
    settings: Settings,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open (or initialise) the preferences file inside `folder`.
    pub fn open(folder: &Path) -> Result<SettingsStore> {
        let path = folder.join(PREFERENCES_FILE);
        let prefs = Preferences::load(&path)?;
        let (settings, dirty) = Settings::from_preferences(&prefs)?;
        let (tx, _rx) = watch::channel(settings.clone());
        let mut store = SettingsStore { path, prefs, settings, tx };
        if dirty {
            debug!(path = %store.path.display(), "persisting migrated preferences");
            store.commit()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Receive a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Re-read the file, returning whether anything changed.
    pub fn reload(&mut self) -> Result<bool> {
        let prefs = Preferences::load(&self.path)?;
        let (settings, dirty) = Settings::from_preferences(&prefs)?;
        self.prefs = prefs;
        if dirty {
            // hand edits may drop ids; store the generated ones so the next
            // reload sees the same settings
            debug!(path = %self.path.display(), "persisting migrated preferences");
            settings.write_to(&mut self.prefs)?;
            self.prefs.save(&self.path)?;
        }
        if settings == self.settings {
            return Ok(false);
        }
        self.settings = settings.clone();
        self.tx.send_replace(settings);
        Ok(true)
    }

    pub fn templates(&self) -> &[SaveTemplate] {
        &self.settings.templates
    }

    pub fn template(&self, id: &str) -> Option<&SaveTemplate> {
        self.settings.template(id)
    }

    /// Resolve a user-supplied template reference, or the selected template.
    pub fn resolve_template(&self, key: Option<&str>) -> Result<SaveTemplate> {
        match key {
            Some(k) => self.settings.find(k).cloned(),
            None => self.settings.selected_template().cloned(),
        }
    }

    pub fn add_template(&mut self, name: &str) -> Result<SaveTemplate> {
        let template = SaveTemplate::new(name);
        if template.name.is_empty() {
            return specific_fail_str!("template name cannot be empty");
        }
        self.settings.templates.push(template.clone());
        self.commit()?;
        info!(id = %template.id, name = %template.name, "template added");
        Ok(template)
    }

    /// Replace the stored template with the same id.
    pub fn update_template(&mut self, template: SaveTemplate) -> Result<()> {
        let mut template = template;
        template.normalize();
        match self.settings.templates.iter_mut().find(|t| t.id == template.id) {
            Some(slot) => *slot = template,
            None => return specific_fail!(format!("template '{}' doesn't exist", template.id)),
        }
        self.commit()
    }

    pub fn rename_template(&mut self, id: &str, name: &str) -> Result<()> {
        let name = name.replace('\n', " ").trim().to_string();
        if name.is_empty() {
            return specific_fail_str!("template name cannot be empty");
        }
        let mut template = match self.template(id) {
            Some(t) => t.clone(),
            None => return specific_fail!(format!("template '{}' doesn't exist", id)),
        };
        template.name = name;
        self.update_template(template)
    }

    /// Delete a template; the default template cannot be deleted.
    pub fn delete_template(&mut self, id: &str) -> Result<()> {
        if id == self.settings.default_template_id {
            return specific_fail_str!("the default template cannot be deleted");
        }
        let pos = match self.settings.templates.iter().position(|t| t.id == id) {
            Some(p) => p,
            None => return specific_fail!(format!("template '{}' doesn't exist", id)),
        };
        let removed = self.settings.templates.remove(pos);
        if self.settings.selected_template_id == id {
            self.settings.selected_template_id = self.settings.default_template_id.clone();
        }
        if self.settings.reminder_template_id.as_deref() == Some(id) {
            self.settings.reminder_template_id = None;
        }
        self.commit()?;
        info!(id = %removed.id, name = %removed.name, "template deleted");
        Ok(())
    }

    pub fn select_template(&mut self, id: &str) -> Result<()> {
        self.require(id)?;
        self.settings.selected_template_id = id.to_string();
        self.commit()
    }

    pub fn set_default_template(&mut self, id: &str) -> Result<()> {
        self.require(id)?;
        self.settings.default_template_id = id.to_string();
        self.commit()
    }

    pub fn set_reminder_template(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.require(id)?;
        }
        self.settings.reminder_template_id = id.map(str::to_string);
        self.commit()
    }

    pub fn reminder(&self) -> &ReminderSchedule {
        &self.settings.reminder
    }

    pub fn set_reminder(&mut self, schedule: ReminderSchedule) -> Result<()> {
        schedule.validate()?;
        self.settings.reminder = schedule;
        self.commit()
    }

    pub fn set_notify_command(&mut self, command: Option<&str>) -> Result<()> {
        self.settings.notify_command = command
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.commit()
    }

    /// The last minute a reminder fired, as recorded on disk.
    pub fn last_reminder_fired(&self) -> Option<NaiveDateTime> {
        self.prefs
            .get_str(KEY_REMINDER_LAST_FIRED)
            .and_then(|s| NaiveDateTime::parse_from_str(s, LAST_FIRED_FMT).ok())
    }

    pub fn record_reminder_fired(&mut self, minute: NaiveDateTime) -> Result<()> {
        // pick up edits made by other processes before writing the whole file
        self.reload()?;
        self.prefs.put_str(KEY_REMINDER_LAST_FIRED, &minute.format(LAST_FIRED_FMT).to_string());
        self.prefs.save(&self.path)
    }

    /// Text of a note that could not be saved, kept for another attempt.
    pub fn draft(&self) -> Option<String> {
        self.prefs
            .get_str(KEY_DRAFT_TEXT)
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
    }

    pub fn save_draft(&mut self, text: &str) -> Result<()> {
        self.reload()?;
        self.prefs.put_str(KEY_DRAFT_TEXT, text);
        self.prefs.save(&self.path)
    }

    pub fn clear_draft(&mut self) -> Result<()> {
        self.reload()?;
        if self.prefs.get_str(KEY_DRAFT_TEXT).is_none() {
            return Ok(());
        }
        self.prefs.remove(KEY_DRAFT_TEXT);
        self.prefs.save(&self.path)
    }

    fn require(&self, id: &str) -> Result<()> {
        if self.template(id).is_none() {
            return specific_fail!(format!("template '{}' doesn't exist", id));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(folder) = self.path.parent() {
            if !folder.as_os_str().is_empty() && !folder.exists() {
                fs::create_dir_all(folder)?;
            }
        }
        self.settings.write_to(&mut self.prefs)?;
        self.prefs.save(&self.path)?;
        self.tx.send_replace(self.settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_round_trip_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);
        let mut prefs = Preferences::default();
        prefs.put_str("A", "text: with colon");
        prefs.put_bool("B", true);
        prefs.put_u32("C", 45);
        prefs.save(&path).unwrap();

        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded.get_str("A"), Some("text: with colon"));
        assert_eq!(loaded.get_bool("B"), Some(true));
        assert_eq!(loaded.get_u32("C"), Some(45));
        assert_eq!(loaded.get_u32("A"), None);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn find_by_name_and_prefix() {
        let mut a = SaveTemplate::new("Work");
        a.id = "abc123".to_string();
        let mut b = SaveTemplate::new("Home");
        b.id = "abd456".to_string();
        let settings = Settings {
            templates: vec![a, b],
            default_template_id: "abc123".to_string(),
            selected_template_id: "abc123".to_string(),
            reminder_template_id: None,
            reminder: ReminderSchedule::default(),
            notify_command: None,
        };
        assert_eq!(settings.find("home").unwrap().id, "abd456");
        assert_eq!(settings.find("abc").unwrap().name, "Work");
        assert!(settings.find("ab").is_err());
        assert!(settings.find("zzz").is_err());
        assert_eq!(settings.reminder_template().unwrap().id, "abc123");
    }
}
