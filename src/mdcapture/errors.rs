use std::fmt;
use std::convert::From;
use std::error::Error as StdError;
use std::io::Error as IoError;
use std::path::PathBuf;
use std::string::FromUtf8Error;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Why a note (or shared file) could not be filed.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("no folder selected for this template")]
    FolderNotSelected,
    #[error("folder {} is missing or not writable", .0.display())]
    FolderUnwritable(PathBuf),
    #[error("note is empty")]
    EmptyNote,
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: IoError,
    },
}

#[derive(Debug)]
pub enum ErrorKind {
    Save(SaveError),
    Chrono(chrono::ParseError),
    InternalIo(IoError),
    Generic,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub desc: String,
    pub detail: Option<String>,
}

impl Error {
    /// The save failure behind this error, if it came from the save pipeline.
    pub fn save_error(&self) -> Option<&SaveError> {
        match self.kind {
            ErrorKind::Save(ref e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.desc)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.kind {
            ErrorKind::Save(ref e) => Some(e),
            ErrorKind::Chrono(ref e) => Some(e),
            ErrorKind::InternalIo(ref e) => Some(e),
            ErrorKind::Generic => None,
        }
    }
}

#[macro_export]
macro_rules! specific_fail {
    ($short:expr) => {{
        use $crate::errors::{Error, ErrorKind};
        Err(::std::convert::From::from(
            Error {
                kind: ErrorKind::Generic,
                desc: $short,
                detail: None
            }
        ))
    }}
}

#[macro_export]
macro_rules! specific_fail_str {
    ($s:expr) => {
        $crate::specific_fail!($s.to_string())
    }
}

impl From<SaveError> for Error {
    fn from(err: SaveError) -> Error {
        Error {
            desc: err.to_string(),
            detail: None,
            kind: ErrorKind::Save(err),
        }
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Error {
        Error {
            kind: ErrorKind::Chrono(err),
            desc: "failed to parse date/time".to_string(),
            detail: Some(err.to_string()),
        }
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error {
            desc: err.to_string(),
            detail: None,
            kind: ErrorKind::InternalIo(err),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Error {
        Error::from(err.error)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: format!("UTF-8 error: {}", err),
            detail: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: "formatting error".to_string(),
            detail: None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: format!("YAML error: {}", err),
            detail: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: format!("JSON error: {}", err),
            detail: None,
        }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: err,
            detail: None,
        }
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error {
            kind: ErrorKind::Generic,
            desc: err.to_string(),
            detail: None,
        }
    }
}
