#![deny(missing_docs)]

//! Error handling for the Quiver workspace.
//!
//! Every fallible operation returns a [`QuiverResult`]. Each [`QuiverError`] maps onto a stable
//! numeric [`ErrorCode`] so that failures can be reported across the C ABI without losing the
//! distinction between "not this format" and "corrupt or incomplete data".

use std::backtrace::Backtrace;
// Aliased in the enum below: thiserror treats a field whose type is literally named `Backtrace`
// as a provider source and emits nightly-only `Error::provide` code.
use std::backtrace::Backtrace as CapturedBacktrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{fmt, io};

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Stable numeric codes for every error category.
///
/// These values are part of the C interface and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The operation succeeded.
    Ok = 0,
    /// A required argument was missing or an index was out of range.
    InvalidArgument = -1,
    /// Memory for the operation could not be allocated.
    AllocationFailed = -2,
    /// The input does not start with the expected magic number.
    FormatMismatch = -3,
    /// The input was written by an unsupported format version.
    UnsupportedVersion = -4,
    /// The input ended before a declared length was satisfied.
    Truncated = -5,
    /// The underlying file system reported an error.
    Io = -6,
    /// A block could not be compressed or decompressed.
    Compression = -7,
    /// The input is structurally invalid.
    Corrupt = -8,
}

impl ErrorCode {
    /// The raw value of the code as passed over the C interface.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// The top-level error type for Quiver.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum QuiverError {
    /// A catch-all error for failures that do not fit any other category.
    #[error("{0}\nBacktrace:\n{1}")]
    Generic(ErrString, CapturedBacktrace),
    /// A required argument was missing or malformed.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, CapturedBacktrace),
    /// An index was out of the range `[start, stop)`.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, CapturedBacktrace),
    /// An allocation of the given number of bytes failed.
    #[error("failed to allocate {0} bytes\nBacktrace:\n{1}")]
    AllocationFailed(usize, CapturedBacktrace),
    /// The input carries a different magic number than expected.
    #[error("{0}\nBacktrace:\n{1}")]
    FormatMismatch(ErrString, CapturedBacktrace),
    /// The input carries a format version this build does not understand.
    #[error("{0}\nBacktrace:\n{1}")]
    UnsupportedVersion(ErrString, CapturedBacktrace),
    /// The input ended before all declared bytes could be read.
    #[error("{0}\nBacktrace:\n{1}")]
    Truncated(ErrString, CapturedBacktrace),
    /// The input is structurally invalid, e.g. a negative length.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidSerde(ErrString, CapturedBacktrace),
    /// A compression codec failed.
    #[error("{0}\nBacktrace:\n{1}")]
    Compression(ErrString, CapturedBacktrace),
    /// A wrapper that adds a message to another error.
    #[error("{0}: {1}")]
    Context(ErrString, Box<QuiverError>),
    /// An error from the underlying file system or byte stream.
    #[error(transparent)]
    IOError(#[from] io::Error),
    /// A protobuf message failed to decode.
    #[error(transparent)]
    ProstDecodeError(#[from] prost::DecodeError),
    /// A protobuf message failed to encode.
    #[error(transparent)]
    ProstEncodeError(#[from] prost::EncodeError),
}

impl QuiverError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        QuiverError::Context(msg.into(), Box::new(self))
    }

    /// The stable code for this error. Context wrappers report the code of the wrapped error.
    pub fn code(&self) -> ErrorCode {
        match self {
            QuiverError::Generic(..) | QuiverError::ProstEncodeError(..) => ErrorCode::Corrupt,
            QuiverError::InvalidArgument(..) | QuiverError::OutOfBounds(..) => {
                ErrorCode::InvalidArgument
            }
            QuiverError::AllocationFailed(..) => ErrorCode::AllocationFailed,
            QuiverError::FormatMismatch(..) => ErrorCode::FormatMismatch,
            QuiverError::UnsupportedVersion(..) => ErrorCode::UnsupportedVersion,
            QuiverError::Truncated(..) => ErrorCode::Truncated,
            QuiverError::InvalidSerde(..) | QuiverError::ProstDecodeError(..) => {
                ErrorCode::Corrupt
            }
            QuiverError::Compression(..) => ErrorCode::Compression,
            QuiverError::Context(_, inner) => inner.code(),
            QuiverError::IOError(err) => {
                if err.kind() == io::ErrorKind::OutOfMemory {
                    ErrorCode::AllocationFailed
                } else {
                    ErrorCode::Io
                }
            }
        }
    }

    /// The error message without the captured backtrace.
    pub fn message(&self) -> String {
        match self {
            QuiverError::Generic(msg, _)
            | QuiverError::InvalidArgument(msg, _)
            | QuiverError::FormatMismatch(msg, _)
            | QuiverError::UnsupportedVersion(msg, _)
            | QuiverError::Truncated(msg, _)
            | QuiverError::InvalidSerde(msg, _)
            | QuiverError::Compression(msg, _) => msg.to_string(),
            QuiverError::OutOfBounds(idx, start, stop, _) => {
                format!("index {idx} out of bounds from {start} to {stop}")
            }
            QuiverError::AllocationFailed(size, _) => format!("failed to allocate {size} bytes"),
            QuiverError::Context(msg, inner) => format!("{msg}: {}", inner.message()),
            QuiverError::IOError(err) => err.to_string(),
            QuiverError::ProstDecodeError(err) => err.to_string(),
            QuiverError::ProstEncodeError(err) => err.to_string(),
        }
    }
}

impl Debug for QuiverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return [`QuiverError`]s as their error type.
pub type QuiverResult<T> = Result<T, QuiverError>;

/// A trait for unwrapping a value while panicking with a [`QuiverError`] message.
///
/// Only used where failure indicates a broken internal invariant.
pub trait QuiverExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value, or panics with the given message.
    fn quiver_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> QuiverExpect for Result<T, E>
where
    E: Into<QuiverError>,
{
    type Output = T;

    #[inline(always)]
    fn quiver_expect(self, msg: &str) -> Self::Output {
        self.map_err(Into::<QuiverError>::into)
            .unwrap_or_else(|e| quiver_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> QuiverExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn quiver_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = QuiverError::Generic(msg.to_string().into(), Backtrace::capture());
            quiver_panic!(err)
        })
    }
}

/// A convenient macro for creating a [`QuiverError`].
#[macro_export]
macro_rules! quiver_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::QuiverError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
    }};
    (AllocationFailed: $size:expr) => {{
        use std::backtrace::Backtrace;
        $crate::QuiverError::AllocationFailed($size, Backtrace::capture())
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::QuiverError::Context($msg.into(), Box::new($err))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::QuiverError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::quiver_err!(Generic: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a [`QuiverError`] from the current function.
#[macro_export]
macro_rules! quiver_bail {
    ($($tt:tt)+) => {
        return Err($crate::quiver_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a [`QuiverError`].
#[macro_export]
macro_rules! quiver_panic {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::quiver_panic!($crate::quiver_err!(OutOfBounds: $idx, $start, $stop))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::quiver_panic!($crate::quiver_err!($variant: $fmt, $($arg),*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::quiver_panic!($crate::quiver_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::QuiverError = $err;
        panic!("{}", err)
    }};
}
