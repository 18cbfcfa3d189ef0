use std::{fmt, result};

/// Crate wide Result type, short-hand for `std::result::Result<T, Error>`.
pub type Result<T> = result::Result<T, Error>;

/// Crate wide error type.
///
/// Every variant carries a human readable message along with the file/line
/// of the call-site that raised it, via the [err_at] macro.
#[derive(Debug, Clone)]
pub enum Error {
    IOError(String, String),
    DecodeFail(String, String),
    FailConvert(String, String),
    Fatal(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),

    DatabaseExists(String, String),
    DatabaseNotFound(String, String),
    FormExists(String, String),
    FormNotFound(String, String),
    KeyNotFound(String, String),
    LinkNotFound(String, String),
    DuplicateKey(String, String),
    UnsupportedIndexType(String, String),
    IndexFileMissing(String, String),
    RecoveryCorrupt(String, String),
    ShortRead(String, String),
    CorruptValue(String, String),
    PoolOverload(String, String),
    PoolExpiryInvalid(String, String),
    TLSConfigIncomplete(String, String),
    RateLimitConfigInvalid(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            IOError(p, msg) => write!(f, "IOError: {} @ {}", msg, p),
            DecodeFail(p, msg) => write!(f, "DecodeFail: {} @ {}", msg, p),
            FailConvert(p, msg) => write!(f, "FailConvert: {} @ {}", msg, p),
            Fatal(p, msg) => write!(f, "Fatal: {} @ {}", msg, p),
            InvalidFile(p, msg) => write!(f, "InvalidFile: {} @ {}", msg, p),
            InvalidInput(p, msg) => write!(f, "InvalidInput: {} @ {}", msg, p),
            IPCFail(p, msg) => write!(f, "IPCFail: {} @ {}", msg, p),
            ThreadFail(p, msg) => write!(f, "ThreadFail: {} @ {}", msg, p),
            DatabaseExists(p, msg) => write!(f, "DatabaseExists: {} @ {}", msg, p),
            DatabaseNotFound(p, msg) => write!(f, "DatabaseNotFound: {} @ {}", msg, p),
            FormExists(p, msg) => write!(f, "FormExists: {} @ {}", msg, p),
            FormNotFound(p, msg) => write!(f, "FormNotFound: {} @ {}", msg, p),
            KeyNotFound(p, msg) => write!(f, "KeyNotFound: {} @ {}", msg, p),
            LinkNotFound(p, msg) => write!(f, "LinkNotFound: {} @ {}", msg, p),
            DuplicateKey(p, msg) => write!(f, "DuplicateKey: {} @ {}", msg, p),
            UnsupportedIndexType(p, msg) => write!(f, "UnsupportedIndexType: {} @ {}", msg, p),
            IndexFileMissing(p, msg) => write!(f, "IndexFileMissing: {} @ {}", msg, p),
            RecoveryCorrupt(p, msg) => write!(f, "RecoveryCorrupt: {} @ {}", msg, p),
            ShortRead(p, msg) => write!(f, "ShortRead: {} @ {}", msg, p),
            CorruptValue(p, msg) => write!(f, "CorruptValue: {} @ {}", msg, p),
            PoolOverload(p, msg) => write!(f, "PoolOverload: {} @ {}", msg, p),
            PoolExpiryInvalid(p, msg) => write!(f, "PoolExpiryInvalid: {} @ {}", msg, p),
            TLSConfigIncomplete(p, msg) => write!(f, "TLSConfigIncomplete: {} @ {}", msg, p),
            RateLimitConfigInvalid(p, msg) => write!(f, "RateLimitConfigInvalid: {} @ {}", msg, p),
        }
    }
}

impl std::error::Error for Error {}

/// Tag a fallible expression, or a bare message, with the call-site location
/// and wrap it into the matching [Error] variant.
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{}: {}", msg, err)))
            }
        }
    }};
}
