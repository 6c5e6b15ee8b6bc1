use std::fs::{create_dir_all, File};
use std::io::{stdin, stdout, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::env::var;

use crossterm::{
    style::{Attribute, SetAttribute},
    execute,
};

// tempfile imports
use tempfile::Builder;

// mdcapture imports
use crate::{specific_fail, specific_fail_str};
use crate::errors::{Result, Error, ErrorKind};

pub fn stdout_is_tty() -> bool {
    stdout().is_terminal()
}

pub fn stdin_is_tty() -> bool {
    stdin().is_terminal()
}

/// Read everything piped on stdin.
pub fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

pub fn drop_to_editor(contents: &str) -> Result<String> {
    // setup temporary file
    let tmpfile = Builder::new()
        .prefix("mdcapture")
        .suffix(".md")
        .rand_bytes(5)
        .tempfile()?;

    let tmppath = tmpfile.path().to_owned();

    {
        let mut file = File::create(&tmppath)?;
        file.write_all(contents.as_bytes())?;
    }

    let editor = var("VISUAL").or_else(|_| var("EDITOR"))
        .unwrap_or_else(|_| "nano".to_string());

    // lets start `editor` and edit the file at `tmppath`
    let mut editor_command = Command::new(&editor);
    editor_command.arg(tmppath.display().to_string());
    editor_command.stdin(Stdio::inherit());
    editor_command.stdout(Stdio::inherit());
    editor_command.stderr(Stdio::inherit());

    let mut editor_proc = editor_command.spawn().map_err(|e| Error {
        kind: ErrorKind::Generic,
        desc: format!("failed to start editor '{}': {}", editor, e),
        detail: None,
    })?;

    match editor_proc.wait() {
        Ok(status) if status.success() => {
            let mut file = File::open(&tmppath)?;
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(content)
        }
        _ => specific_fail_str!("the editor process failed."),
    }
}

pub fn get_yn_input(message: &str) -> Result<bool> {
    print!("{}", message);
    stdout().flush()?;

    let stdin = stdin();
    let yes = ["y", "Y", "yes", "YES", "Yes"];
    let no = ["n", "N", "no", "NO", "No"];

    loop {
        print!("[y/n]# ");
        stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        let input = input.trim();
        if yes.contains(&input) {
            return Ok(true);
        } else if no.contains(&input) {
            return Ok(false);
        };
        println!("invalid input.");
    }
}

pub fn pretty_line(bold: &str, plain: &str, tty: bool) -> Result<()> {
    let mut stdout = stdout();
    if tty {
        execute!(stdout, SetAttribute(Attribute::Bold))?;
    }
    print!("{}", bold);
    if tty {
        execute!(stdout, SetAttribute(Attribute::Reset))?;
    }
    print!("{}", plain);
    Ok(())
}

pub fn format_field(value: &str, width: usize, truncate: bool) -> String {
    if value.chars().count() > width && width > 3 && truncate {
        format!("{: <1$.1$}...", value, width - 3)
    } else {
        format!("{: <1$.1$}", value, width)
    }
}

/// Where preferences live: `--data-dir`, else `~/.mdcapture`. A *file* at
/// `~/.mdcapture` holds the path of the real folder.
pub fn find_data_folder(data_folder: &Option<String>) -> Result<PathBuf> {
    if let Some(df) = data_folder {
        Ok(PathBuf::from(df))
    } else {
        match dirs::home_dir() {
            Some(p) => {
                let default_path = p.join(".mdcapture");
                if default_path.is_file() {
                    let mut file = File::open(&default_path)?;
                    let mut contents = String::new();
                    file.read_to_string(&mut contents)?;
                    let trimmed = contents.trim();
                    if trimmed.is_empty() {
                        return specific_fail_str!("~/.mdcapture is a file but is empty. It should contain a path to the data directory.");
                    }
                    Ok(PathBuf::from(trimmed))
                } else {
                    Ok(default_path)
                }
            },
            None => specific_fail_str!("failed to find your home directory"),
        }
    }
}

/// Make sure the data folder exists, asking first unless `yes`.
pub fn ensure_data_folder(folder: &PathBuf, yes: bool) -> Result<()> {
    if folder.is_dir() {
        return Ok(());
    }
    if folder.exists() {
        return specific_fail!(format!("{} is not a directory.", folder.display()));
    }
    if !yes {
        let message = format!("{} doesn't exist, would you like to create it?\n", folder.display());
        if !get_yn_input(&message)? {
            return specific_fail_str!("ok bye ♥");
        }
    }
    create_dir_all(folder)?;
    Ok(())
}
