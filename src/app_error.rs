use std::io;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream at a message boundary.
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("message of {0} bytes exceeds the maximum message size of {1}")]
    MaxMessageSizeExceeded(usize, usize),

    #[error("malformed netstring header: {0}")]
    NetstringMalformedHeader(String),

    #[error("netstring terminator not found")]
    NetstringDelimiterNotFound,

    #[error("address resolution failed: {0}")]
    Resolve(String),

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}

impl AppError {
    /// Whether this error came out of the framing layer rather than the
    /// transport. Framing errors mean the byte stream can no longer be
    /// resynchronised and the connection is unusable.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            AppError::MaxMessageSizeExceeded(_, _)
                | AppError::NetstringMalformedHeader(_)
                | AppError::NetstringDelimiterNotFound
        )
    }
}

/// The error used when the peer disappears in the middle of a frame.
pub(crate) fn connection_reset() -> AppError {
    AppError::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

/// Maps the `UnexpectedEof` produced by `read_exact` onto the same
/// connection-reset error the chunked read paths report.
pub(crate) fn map_eof(error: io::Error) -> AppError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        connection_reset()
    } else {
        AppError::Io(error)
    }
}
