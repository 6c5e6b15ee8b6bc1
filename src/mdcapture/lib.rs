pub mod args;
pub mod errors;
pub mod filing;
pub mod formatter;
pub mod placeholder;
pub mod reminder;
pub mod share;
pub mod speech;
pub mod store;
pub mod template;
pub mod utils;

use std::io::stdin;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use args::{Cli, Commands, ReminderCommand, TemplateChanges, TemplateCommand};
use errors::Result;
use filing::{NoteWriter, SaveOutcome};
use placeholder::SystemClock;
use reminder::{spawn_reminders, CommandNotifier, StdoutNotifier};
use share::Shared;
use speech::{dictate, DictationBuffer, LineTranscriber};
use store::SettingsStore;
use template::SaveTemplate;
use utils::{ensure_data_folder, find_data_folder, get_yn_input, pretty_line, stdin_is_tty, stdout_is_tty};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let folder = find_data_folder(&cli.data_dir)?;
    ensure_data_folder(&folder, cli.yes)?;
    let mut store = SettingsStore::open(&folder)?;
    let writer = NoteWriter::new(Arc::new(SystemClock));

    match &cli.command {
        Commands::Save { text, template, from_reminder, editor } => {
            let template = if *from_reminder {
                store.settings().reminder_template()?.clone()
            } else {
                store.resolve_template(template.as_deref())?
            };
            let draft = if *editor { store.draft() } else { None };
            let note = if *editor {
                utils::drop_to_editor(draft.as_deref().unwrap_or(""))?
            } else if !text.is_empty() {
                text.join(" ")
            } else if !stdin_is_tty() {
                utils::read_stdin()?
            } else {
                return specific_fail_str!("nothing to save: pass the note text, pipe it in, or use --editor");
            };
            let outcome = file_note(&mut store, &writer, &note, &template, draft.is_some())?;
            println!("{}", outcome.message());
        }
        Commands::Share { file, template } => {
            let template = store.resolve_template(template.as_deref())?;
            if file.is_empty() {
                let text = utils::read_stdin()?;
                let outcome = file_note(&mut store, &writer, &text, &template, false)?;
                println!("{}", outcome.message());
            } else {
                let items = file.iter().cloned().map(Shared::File);
                let results = share::share_all(&writer, &template, items);
                let mut failed = 0;
                for (path, result) in file.iter().zip(results) {
                    match result {
                        Ok(outcome) => println!("{}", outcome.message()),
                        Err(e) => {
                            failed += 1;
                            eprintln!("{}: {}", path.display(), e);
                        }
                    }
                }
                if failed > 0 {
                    return specific_fail!(format!("{} of {} shared files could not be saved", failed, file.len()));
                }
            }
        }
        Commands::Dictate { template, no_save } => {
            let template = store.resolve_template(template.as_deref())?;
            let mut transcriber = LineTranscriber::new(stdin().lock());
            let mut buffer = DictationBuffer::new("");
            dictate(&mut transcriber, &mut buffer)?;
            if *no_save {
                println!("{}", buffer.text());
            } else {
                let outcome = file_note(&mut store, &writer, buffer.text(), &template, false)?;
                println!("{}", outcome.message());
            }
        }
        Commands::Template(cmd) => run_template(&mut store, cmd, cli.yes)?,
        Commands::Reminder(cmd) => run_reminder(store, cmd)?,
    }

    Ok(())
}

/// Save `note`, keeping it as a draft when filing fails so that
/// `save --editor` can offer it again. A draft that was edited into this
/// note is cleared once the save succeeds.
pub fn file_note(store: &mut SettingsStore,
                 writer: &NoteWriter,
                 note: &str,
                 template: &SaveTemplate,
                 from_draft: bool) -> Result<SaveOutcome> {
    match writer.save(note, &template.resolve()) {
        Ok(outcome) => {
            if from_draft {
                store.clear_draft()?;
            }
            Ok(outcome)
        }
        Err(e) => {
            if !note.trim().is_empty() {
                match store.save_draft(note) {
                    Ok(()) => eprintln!("note kept as a draft, run `mdcapture save --editor` to try again"),
                    Err(d) => warn!(error = %d, "could not keep the note as a draft"),
                }
            }
            Err(e.into())
        }
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // a second init (tests calling run twice) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_template(store: &mut SettingsStore, cmd: &TemplateCommand, yes: bool) -> Result<()> {
    match cmd {
        TemplateCommand::List => {
            let settings = store.settings();
            for t in settings.templates.iter() {
                t.print_line(t.id == settings.default_template_id,
                             t.id == settings.selected_template_id)?;
            }
        }
        TemplateCommand::Show { template } => {
            let t = store.resolve_template(Some(template.as_str()))?;
            let tty = stdout_is_tty();
            let settings = store.settings();
            pretty_line("template: ", &format!("{}\n", t.name), tty)?;
            pretty_line("default: ", &format!("{}\n", t.id == settings.default_template_id), tty)?;
            pretty_line("selected: ", &format!("{}\n", t.id == settings.selected_template_id), tty)?;
            println!("{}", t);
        }
        TemplateCommand::Add { name } => {
            let t = store.add_template(name)?;
            println!("template '{}' added ({})", t.name, t.id);
        }
        TemplateCommand::Rename { template, name } => {
            let t = store.resolve_template(Some(template.as_str()))?;
            store.rename_template(&t.id, name)?;
            println!("renamed '{}' to '{}'", t.name, name.trim());
        }
        TemplateCommand::Delete { template } => {
            let t = store.resolve_template(Some(template.as_str()))?;
            if !yes {
                let message = format!("delete template '{}'?\n", t.name);
                if !get_yn_input(&message)? {
                    return specific_fail_str!("ok bye ♥");
                }
            }
            store.delete_template(&t.id)?;
            println!("deleted template '{}'", t.name);
        }
        TemplateCommand::Select { template } => {
            let t = store.resolve_template(Some(template.as_str()))?;
            store.select_template(&t.id)?;
            println!("selected template '{}'", t.name);
        }
        TemplateCommand::Default { template } => {
            let t = store.resolve_template(Some(template.as_str()))?;
            store.set_default_template(&t.id)?;
            println!("'{}' is now the default template", t.name);
        }
        TemplateCommand::Edit { template, changes } => {
            let mut t = store.resolve_template(Some(template.as_str()))?;
            apply_changes(&mut t, changes);
            store.update_template(t.clone())?;
            println!("edited template '{}'", t.name);
        }
    }
    Ok(())
}

/// Copy every given flag onto the template.
pub fn apply_changes(t: &mut SaveTemplate, changes: &TemplateChanges) {
    if let Some(v) = &changes.folder { t.folder_uri = v.trim().to_string(); }
    if let Some(v) = &changes.filename { t.note_date_template = v.clone(); }
    if let Some(v) = changes.list_items { t.is_list_items_enabled = v; }
    if let Some(v) = changes.indent { t.list_item_indent_level = v; }
    if let Some(v) = changes.timestamp { t.is_timestamp_enabled = v; }
    if let Some(v) = &changes.timestamp_template { t.timestamp_template = v.clone(); }
    if let Some(v) = changes.date_created { t.is_date_created_enabled = v; }
    if let Some(v) = &changes.property { t.property_name = v.trim().to_string(); }
    if let Some(v) = &changes.date_created_template { t.date_created_template = v.clone(); }
    if let Some(v) = changes.text_in_filename { t.is_note_text_in_filename_enabled = v; }
    if let Some(v) = changes.text_in_filename_length { t.note_text_in_filename_length = v; }
}

fn run_reminder(mut store: SettingsStore, cmd: &ReminderCommand) -> Result<()> {
    match cmd {
        ReminderCommand::Show => {
            println!("{}", store.reminder());
            let settings = store.settings();
            if let Ok(t) = settings.reminder_template() {
                println!("template: {}", t.name);
            }
            match &settings.notify_command {
                Some(cmd) => println!("notify command: {}", cmd),
                None => println!("notify command: (print to stdout)"),
            }
        }
        ReminderCommand::Set { enabled, text, interval, start, end, notify_command } => {
            let mut schedule = store.reminder().clone();
            if let Some(v) = enabled { schedule.enabled = *v; }
            if let Some(v) = text { schedule.text = v.clone(); }
            if let Some(v) = interval { schedule.interval_minutes = *v; }
            if let Some(v) = start { schedule.start_time = v.trim().to_string(); }
            if let Some(v) = end { schedule.end_time = v.trim().to_string(); }
            store.set_reminder(schedule)?;
            if let Some(cmd) = notify_command {
                store.set_notify_command(Some(cmd.as_str()))?;
            }
            println!("{}", store.reminder());
        }
        ReminderCommand::Template { template, clear } => {
            if *clear {
                store.set_reminder_template(None)?;
                println!("reminder notes use the default template");
            } else if let Some(key) = template {
                let t = store.resolve_template(Some(key.as_str()))?;
                store.set_reminder_template(Some(t.id.as_str()))?;
                println!("reminder notes use template '{}'", t.name);
            } else {
                println!("{}", store.settings().reminder_template()?.name);
            }
        }
        ReminderCommand::Run => {
            let command = store.settings().notify_command.clone();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                let clock = Arc::new(SystemClock);
                let handle = match command.as_deref().and_then(CommandNotifier::parse) {
                    Some(notifier) => spawn_reminders(store, notifier, clock),
                    None => spawn_reminders(store, StdoutNotifier, clock),
                };
                info!("waiting for reminders, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                handle.shutdown().await
            })?;
        }
    }
    Ok(())
}
