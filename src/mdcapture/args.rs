use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "mdcapture")]
#[command(version)]
#[command(about = "quick capture of typed, piped or dictated notes into markdown files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Folder holding preferences.yaml
    #[arg(long, env = "MDCAPTURE_DIR", global = true)]
    pub data_dir: Option<String>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "MDCAPTURE_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Do not ask for confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Save a note (reads stdin when no text is given)
    Save {
        /// Note text
        text: Vec<String>,

        /// Template name or id (defaults to the selected template)
        #[arg(short, long)]
        template: Option<String>,

        /// Use the reminder template
        #[arg(long, conflicts_with = "template")]
        from_reminder: bool,

        /// Compose the note in $EDITOR
        #[arg(short, long, conflicts_with = "text")]
        editor: bool,
    },

    /// File text from stdin, or shared files, as another app would
    Share {
        /// Files to share instead of stdin text (repeatable)
        #[arg(short, long)]
        file: Vec<PathBuf>,

        /// Template name or id
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Build a note from transcript events on stdin (partial<TAB>text, final<TAB>text)
    Dictate {
        /// Template name or id
        #[arg(short, long)]
        template: Option<String>,

        /// Print the text instead of saving it
        #[arg(long)]
        no_save: bool,
    },

    /// Manage save templates
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Configure or run reminders
    #[command(subcommand)]
    Reminder(ReminderCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplateCommand {
    /// List templates (* default, > selected)
    List,

    /// Show every setting of a template
    Show {
        template: String,
    },

    /// Create a template with default settings
    Add {
        name: String,
    },

    /// Rename a template
    Rename {
        template: String,
        name: String,
    },

    /// Delete a template (not the default one)
    Delete {
        template: String,
    },

    /// Use this template when none is named
    Select {
        template: String,
    },

    /// Make this the default template
    Default {
        template: String,
    },

    /// Change template settings
    Edit {
        template: String,

        #[command(flatten)]
        changes: TemplateChanges,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TemplateChanges {
    /// Destination folder (path or file:// URI)
    #[arg(long)]
    pub folder: Option<String>,

    /// Filename pattern, e.g. "{{yyyy.MM.dd}}"
    #[arg(long)]
    pub filename: Option<String>,

    /// Format every line as a list item
    #[arg(long)]
    pub list_items: Option<bool>,

    /// Tabs before each list item (0-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub indent: Option<u8>,

    /// Put a timestamp line before the note
    #[arg(long)]
    pub timestamp: Option<bool>,

    /// Timestamp line pattern, e.g. "# {{HH:mm}}"
    #[arg(long)]
    pub timestamp_template: Option<String>,

    /// Write YAML front-matter to new files
    #[arg(long)]
    pub date_created: Option<bool>,

    /// Front-matter property name
    #[arg(long)]
    pub property: Option<String>,

    /// Front-matter value pattern
    #[arg(long)]
    pub date_created_template: Option<String>,

    /// Append the start of the note to the filename
    #[arg(long)]
    pub text_in_filename: Option<bool>,

    /// Characters of note text used in the filename
    #[arg(long)]
    pub text_in_filename_length: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReminderCommand {
    /// Show the reminder schedule
    Show,

    /// Change the reminder schedule
    Set {
        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        text: Option<String>,

        /// Minutes between reminders
        #[arg(long)]
        interval: Option<u32>,

        /// Window start, HH:MM
        #[arg(long)]
        start: Option<String>,

        /// Window end, HH:MM (earlier than start for overnight windows)
        #[arg(long)]
        end: Option<String>,

        /// Program run for each reminder, e.g. "notify-send"; empty to print instead
        #[arg(long)]
        notify_command: Option<String>,
    },

    /// Template used by `save --from-reminder`
    Template {
        template: Option<String>,

        /// Fall back to the default template
        #[arg(long, conflicts_with = "template")]
        clear: bool,
    },

    /// Run the reminder loop until interrupted
    Run,
}
