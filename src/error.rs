//! use certkit_ca::error::CaError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaError>;

/// Represents errors that can occur while generating, loading, issuing or serving certificates.
///
/// This enum provides detailed error messages for various failure scenarios.
#[derive(Debug, Error, Clone)]
pub enum CaError {
    /// Key pair generation failed (for example the random source was exhausted).
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Input was not a well-formed PEM document of the expected kind.
    #[error("Malformed PEM: {0}")]
    MalformedPem(String),

    /// A CA credential file is missing or unreadable.
    #[error("CA credentials not found: {0}")]
    CaNotFound(String),

    /// A CA credential file could not be decoded.
    #[error("CA credentials are corrupt: {0}")]
    CaCorrupt(String),

    /// The CA private key does not belong to the CA certificate.
    #[error("CA key does not match CA certificate: {0}")]
    CaMismatch(String),

    /// The certificate signing request is structurally valid but not acceptable.
    #[error("Invalid certificate signing request: {0}")]
    InvalidCsr(String),

    /// A signature could not be produced.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Transport level failure on a single connection.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A request frame exceeded the configured size limit.
    #[error("Request too large: {size} bytes exceeds limit of {limit} bytes")]
    RequestTooLarge { size: usize, limit: usize },

    /// The issuance server answered with an error response.
    #[error("Issuance rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The service configuration is unusable.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CaError {
    /// Code sent to clients in an error response.
    pub fn code(&self) -> &'static str {
        match self {
            CaError::MalformedPem(_) => "malformed-pem",
            CaError::InvalidCsr(_) => "invalid-csr",
            CaError::SigningError(_) => "signing-failed",
            CaError::RequestTooLarge { .. } => "request-too-large",
            _ => "internal",
        }
    }

    /// Whether this error was caused by the client's request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CaError::MalformedPem(_) | CaError::InvalidCsr(_) | CaError::RequestTooLarge { .. }
        )
    }
}

impl From<std::io::Error> for CaError {
    fn from(err: std::io::Error) -> Self {
        CaError::ConnectionError(err.to_string())
    }
}

impl From<rsa::Error> for CaError {
    fn from(err: rsa::Error) -> Self {
        CaError::KeyGenerationError(err.to_string())
    }
}
