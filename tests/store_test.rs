mod helpers;

use std::fs;

use chrono::NaiveDateTime;
use helpers::Sandbox;
use mdcapture::reminder::ReminderSchedule;
use mdcapture::store::{SettingsStore, DEFAULT_TEMPLATE_NAME, PREFERENCES_FILE};

#[test]
fn fresh_store_synthesises_default_template() {
    let sandbox = Sandbox::new();
    let store = sandbox.store();

    assert_eq!(store.templates().len(), 1);
    let settings = store.settings();
    let default = settings.default_template().unwrap();
    assert_eq!(default.name, DEFAULT_TEMPLATE_NAME);
    assert_eq!(settings.selected_template_id, default.id);
    assert_eq!(settings.reminder_template().unwrap().id, default.id);
    assert!(sandbox.root().join(PREFERENCES_FILE).is_file());
}

#[test]
fn reopening_keeps_ids_stable() {
    let sandbox = Sandbox::new();
    let id = sandbox.store().settings().default_template_id.clone();
    let again = sandbox.store();
    assert_eq!(again.settings().default_template_id, id);
    assert_eq!(again.templates().len(), 1);
}

#[test]
fn default_template_cannot_be_deleted() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    let default_id = store.settings().default_template_id.clone();

    assert!(store.delete_template(&default_id).is_err());
    assert_eq!(store.templates().len(), 1);
}

#[test]
fn deleting_selected_template_falls_back_to_default() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    let default_id = store.settings().default_template_id.clone();
    let work = store.add_template("Work").unwrap();
    store.select_template(&work.id).unwrap();
    store.set_reminder_template(Some(work.id.as_str())).unwrap();

    store.delete_template(&work.id).unwrap();

    let settings = store.settings();
    assert_eq!(settings.selected_template_id, default_id);
    assert_eq!(settings.reminder_template_id, None);
    assert_eq!(settings.reminder_template().unwrap().id, default_id);
}

#[test]
fn changing_the_default_moves_the_protection() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    let old_default = store.settings().default_template_id.clone();
    let work = store.add_template("Work").unwrap();

    store.set_default_template(&work.id).unwrap();
    assert!(store.delete_template(&work.id).is_err());
    store.delete_template(&old_default).unwrap();
    assert_eq!(store.templates().len(), 1);
}

#[test]
fn edits_survive_reopen() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    let mut t = store.resolve_template(None).unwrap();
    t.folder_uri = sandbox.notes().display().to_string();
    t.is_list_items_enabled = true;
    t.list_item_indent_level = 9;
    store.update_template(t.clone()).unwrap();
    store.rename_template(&t.id, "  Journal \n").unwrap();

    let reopened = sandbox.store();
    let stored = reopened.resolve_template(Some("journal")).unwrap();
    assert_eq!(stored.id, t.id);
    assert_eq!(stored.name, "Journal");
    assert!(stored.is_list_items_enabled);
    assert_eq!(stored.list_item_indent_level, 5);
    assert_eq!(stored.folder_uri, sandbox.notes().display().to_string());
}

#[test]
fn legacy_is_default_flag_is_migrated() {
    let sandbox = Sandbox::new();
    let templates = r#"[{"id":"a","name":"First"},{"id":"b","name":"Second","isDefault":true}]"#;
    let yaml = format!("TEMPLATES: '{}'\n", templates);
    fs::write(sandbox.root().join(PREFERENCES_FILE), yaml).unwrap();

    let store = sandbox.store();
    assert_eq!(store.settings().default_template_id, "b");
    assert_eq!(store.settings().selected_template_id, "b");
    assert_eq!(store.template("a").unwrap().note_date_template, "{{yyyy.MM.dd HH_mm_ss}}");

    let on_disk = fs::read_to_string(sandbox.root().join(PREFERENCES_FILE)).unwrap();
    assert!(on_disk.contains("DEFAULT_TEMPLATE_ID: b"));
    assert!(!on_disk.contains("isDefault"));
}

#[test]
fn subscribers_see_committed_changes() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    let mut rx = store.subscribe();

    let work = store.add_template("Work").unwrap();
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().template(&work.id).is_some());
    assert!(!rx.has_changed().unwrap());
}

#[test]
fn reload_picks_up_other_writers() {
    let sandbox = Sandbox::new();
    let mut reader = sandbox.store();
    let mut writer = sandbox.store();

    assert!(!reader.reload().unwrap());
    writer.add_template("Elsewhere").unwrap();
    assert!(reader.reload().unwrap());
    assert_eq!(reader.templates().len(), 2);
}

#[test]
fn invalid_reminder_settings_are_refused() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();

    let zero = ReminderSchedule { interval_minutes: 0, ..ReminderSchedule::default() };
    assert!(store.set_reminder(zero).is_err());
    let bad_time = ReminderSchedule { start_time: "25:00".to_string(), ..ReminderSchedule::default() };
    assert!(store.set_reminder(bad_time).is_err());
    assert_eq!(store.reminder(), &ReminderSchedule::default());

    let night = ReminderSchedule {
        enabled: true,
        interval_minutes: 30,
        start_time: "22:00".to_string(),
        end_time: "02:00".to_string(),
        ..ReminderSchedule::default()
    };
    store.set_reminder(night.clone()).unwrap();
    assert_eq!(SettingsStore::open(sandbox.root()).unwrap().reminder(), &night);
}

#[test]
fn last_fired_minute_is_persisted() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    assert_eq!(store.last_reminder_fired(), None);

    let minute = NaiveDateTime::parse_from_str("2024-03-05 09:00", "%Y-%m-%d %H:%M").unwrap();
    store.record_reminder_fired(minute).unwrap();
    assert_eq!(sandbox.store().last_reminder_fired(), Some(minute));
}

#[test]
fn blank_notify_command_clears_it() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    store.set_notify_command(Some("notify-send -u low")).unwrap();
    assert_eq!(sandbox.store().settings().notify_command.as_deref(), Some("notify-send -u low"));
    store.set_notify_command(Some("  ")).unwrap();
    assert_eq!(sandbox.store().settings().notify_command, None);
}

#[test]
fn hand_edited_template_without_id_settles_after_one_reload() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();

    let templates = r#"[{"id":"a","name":"First"},{"name":"Hand made"}]"#;
    let yaml = format!("TEMPLATES: '{}'\nDEFAULT_TEMPLATE_ID: a\n", templates);
    fs::write(sandbox.root().join(PREFERENCES_FILE), yaml).unwrap();

    assert!(store.reload().unwrap());
    let id = store.resolve_template(Some("Hand made")).unwrap().id;
    assert!(!id.is_empty());
    assert_eq!(store.settings().default_template_id, "a");

    assert!(!store.reload().unwrap());
    assert!(!store.reload().unwrap());
    assert_eq!(sandbox.store().resolve_template(Some("Hand made")).unwrap().id, id);
}

#[test]
fn draft_survives_reopen_and_clears() {
    let sandbox = Sandbox::new();
    let mut store = sandbox.store();
    assert_eq!(store.draft(), None);

    store.save_draft("half a thought").unwrap();
    assert_eq!(sandbox.store().draft().as_deref(), Some("half a thought"));

    // template edits keep the draft
    store.add_template("Work").unwrap();
    assert_eq!(sandbox.store().draft().as_deref(), Some("half a thought"));

    store.clear_draft().unwrap();
    assert_eq!(sandbox.store().draft(), None);
}
