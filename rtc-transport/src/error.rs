use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: closed")]
    ErrBufferClosed,
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("i/o timeout")]
    ErrTimeout,
    #[error("use of closed network connection")]
    ErrUseClosedNetworkConn,
    #[error("end port is less than the start")]
    ErrEndPortLessThanStart,
    #[error("port space exhausted")]
    ErrPortSpaceExhausted,
    #[error("invalid port number")]
    ErrInvalidPortNumber,

    // ICE errors
    /// Indicates connectivity establishment was requested twice.
    #[error("connectivity establishment already started")]
    ErrConnectivityAlreadyStarted,
    /// Indicates the remote username fragment was provided but empty.
    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,
    /// Indicates the remote password was provided but empty.
    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,
    /// Indicates the agent reported established without a selected pair.
    #[error("no selected candidate pair")]
    ErrNoCandidatePairs,

    // DTLS errors
    #[error("fingerprint algorithm is empty")]
    ErrFingerprintAlgorithmEmpty,
    #[error("invalid fingerprint value: {0}")]
    ErrInvalidFingerprint(String),
    #[error("unsupported fingerprint algorithm: {0}")]
    ErrUnsupportedFingerprintAlgorithm(String),
    #[error("dtls engine already consumed by a handshake")]
    ErrDtlsEngineConsumed,
    #[error("dtls handshake failed: {0}")]
    ErrHandshakeFailed(String),

    // Transport manager errors
    #[error("transport manager is closed")]
    ErrTransportClosed,
    #[error("invalid state transition from {0} to {1}")]
    ErrInvalidStateTransition(String, String),

    #[error("{0}")]
    Io(#[source] IoError),
    #[error("mutex poison: {0}")]
    PoisonError(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

impl Error {
    /// Whether the error leaves the session usable. Timeouts and transient
    /// socket conditions are retried by the loops that observe them.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ErrTimeout => true,
            Error::Io(IoError(e)) => is_transient_io_error(e),
            _ => false,
        }
    }
}

/// Classifies a socket error. ICMP-triggered refusals and resets on an
/// unconnected UDP socket are reported per datagram and do not close it.
pub fn is_transient_io_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}
