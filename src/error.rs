use thiserror::Error;

/// Top-level error type for the stratumd library.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported-mode NTP packet.
    #[error("protocol: {0}")]
    Protocol(String),
    /// Network related error (timeout, unreachable host).
    #[error("network: {0}")]
    Network(String),
    /// DNS resolution failure.
    #[error("dns: {0}")]
    Dns(String),
    /// Rejected registry input (bad port, bad address, duplicate target).
    #[error("validation: {0}")]
    Validation(String),
    /// Unknown target id.
    #[error("not found: {0}")]
    NotFound(String),
    /// Resource acquisition failure at startup. Fatal.
    #[error("resource: {0}")]
    Resource(String),
    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Other error cases.
    #[error("other: {0}")]
    Other(String),
}
