use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Db(String),
    Syntax(String),
    Storage(String),
    LockTable(String),
    Schema(String),
    Encoding(String),
    BufferExhausted,
    DuplicateKey(u32),
    KeyNotFound(u32),
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Db(msg) => write!(f, "DB Error. {}", msg),
            Error::Syntax(msg) => write!(f, "SQL Syntax Error. {}", msg),
            Error::Storage(msg) => write!(f, "Storage error. {}", msg),
            Error::LockTable(msg) => write!(f, "Lock error. {}", msg),
            Error::Schema(msg) => write!(f, "Schema error. {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error. {}", msg),
            Error::BufferExhausted => write!(f, "Buffer pool exhausted: no page could be evicted"),
            Error::DuplicateKey(key) => write!(f, "Duplicate key: {}", key),
            Error::KeyNotFound(key) => write!(f, "Key not found: {}", key),
            Error::Other(msg) => write!(f, "Error. {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

/// Builds an `Error` variant with a formatted message, e.g. `err!(Storage, "page {} missing", n)`.
#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}
