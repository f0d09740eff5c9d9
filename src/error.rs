use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::panic::Location;

/// The eleven error kinds the reader can produce, per the container's error
/// taxonomy. Every [`CmpError`] carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Base file missing.
    NotFound,
    /// Truncation before the required number of bytes was read.
    ShortRead,
    /// Header plausibility scoring failed for both byte orders.
    BadMagic,
    /// Positional invariants between header offsets were violated.
    InconsistentHeader,
    /// A segment coordinate lies outside `[min, max]`.
    OutOfRange,
    /// The offset-table entry for a requested segment is zero.
    EmptySegment,
    /// No Huffman-table candidate passed detection.
    TableNotFound,
    /// Candidate code lengths failed the Kraft inequality.
    KraftViolation,
    /// Decoding reached a null trie branch.
    InvalidCode,
    /// The bit cursor ran past `limit_bits` mid-symbol.
    UnexpectedEnd,
    /// Payload assembly ended short of `required_bits`.
    Truncated,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ShortRead => "ShortRead",
            ErrorKind::BadMagic => "BadMagic",
            ErrorKind::InconsistentHeader => "InconsistentHeader",
            ErrorKind::OutOfRange => "OutOfRange",
            ErrorKind::EmptySegment => "EmptySegment",
            ErrorKind::TableNotFound => "TableNotFound",
            ErrorKind::KraftViolation => "KraftViolation",
            ErrorKind::InvalidCode => "InvalidCode",
            ErrorKind::UnexpectedEnd => "UnexpectedEnd",
            ErrorKind::Truncated => "Truncated",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct CmpError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub context: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
    pub location: &'static Location<'static>,
}

pub type Res<T> = Result<T, CmpError>;

impl Error for CmpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.source {
            Some(ref err) => Some(err.deref()),
            None => None,
        }
    }
}

impl Display for CmpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.kind, self.location)?;
        if let Some(context) = &self.context {
            write!(f, " ({context})")?
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?
        }
        if let Some(cause) = &self.source {
            write!(f, "\ncaused by {cause}")?
        }
        Ok(())
    }
}

impl From<CmpError> for std::io::Error {
    fn from(value: CmpError) -> Self {
        let kind = match value.kind {
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::ShortRead | ErrorKind::Truncated => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, value)
    }
}

/// Partially-built error: accumulates message/context/source before an
/// [`ErrorKind`] is attached and it is converted into a [`CmpError`].
#[derive(Default)]
pub(crate) struct ErrorBuilder {
    pub message: Option<String>,
    pub context: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl ErrorBuilder {
    #[track_caller]
    pub(crate) fn into_error(self, kind: ErrorKind) -> CmpError {
        CmpError {
            kind,
            message: self.message,
            context: self.context,
            source: self.source,
            location: Location::caller(),
        }
    }
}

pub(crate) trait ResultBuilder<T>: Sized {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Result<T, ErrorBuilder>;
    fn kind(self, kind: ErrorKind) -> Res<T>;
    fn msg_of<M: Debug>(self, msg: &M) -> Result<T, ErrorBuilder> {
        self.message(|_| format!("{msg:?}"))
    }
}

impl<T> ResultBuilder<T> for Result<T, ErrorBuilder> {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Self {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(ErrorBuilder {
                message: Some(msg(e.message.as_deref())),
                ..e
            }),
        }
    }

    #[track_caller]
    fn kind(self, kind: ErrorKind) -> Res<T> {
        self.map_err(|e| e.into_error(kind))
    }
}

impl<T> ResultBuilder<T> for Option<T> {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Result<T, ErrorBuilder> {
        match self {
            Some(v) => Ok(v),
            None => Err(ErrorBuilder {
                message: Some(msg(None)),
                ..Default::default()
            }),
        }
    }

    #[track_caller]
    fn kind(self, kind: ErrorKind) -> Res<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(ErrorBuilder::default().into_error(kind)),
        }
    }
}

pub(crate) trait WithContext<T, E: Error, C: ErrorContext> {
    fn at(self, context: &C) -> Result<T, ErrorBuilder>;
}

impl<T, E: Error + 'static + Send + Sync, C: ErrorContext> WithContext<T, E, C> for Result<T, E> {
    fn at(self, context: &C) -> Result<T, ErrorBuilder> {
        self.map_err(|e| ErrorBuilder {
            context: context.describe(),
            source: Some(Box::new(e)),
            ..Default::default()
        })
    }
}

pub(crate) trait ErrorContext {
    fn describe(&self) -> Option<String> {
        None
    }

    #[track_caller]
    fn raise<T>(&self, kind: ErrorKind, msg: String) -> Res<T> {
        Err(CmpError {
            kind,
            message: Some(msg),
            context: self.describe(),
            source: None,
            location: Location::caller(),
        })
    }

    fn assert(&self, v: bool, kind: ErrorKind, msg: &str) -> Res<()> {
        if v {
            Ok(())
        } else {
            self.raise(kind, msg.into())
        }
    }

    fn assert_le<T: PartialOrd + Display>(&self, l: T, r: T, kind: ErrorKind) -> Res<()> {
        if l <= r {
            Ok(())
        } else {
            self.raise(kind, format!("expected {l} <= {r}"))
        }
    }

    fn assert_lt<T: PartialOrd + Display>(&self, l: T, r: T, kind: ErrorKind) -> Res<()> {
        if l < r {
            Ok(())
        } else {
            self.raise(kind, format!("expected {l} < {r}"))
        }
    }

    fn assert_eq<T: PartialOrd + Display>(&self, l: T, r: T, kind: ErrorKind) -> Res<()> {
        if l == r {
            Ok(())
        } else {
            self.raise(kind, format!("expected {l} == {r}"))
        }
    }
}
