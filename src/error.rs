use thiserror::Error;

/// Result type for soundbar operations
pub type Result<T> = std::result::Result<T, SoundbarError>;

/// Errors that can occur when talking to an LG soundbar
#[derive(Error, Debug)]
pub enum SoundbarError {
    /// TCP connect was refused or timed out
    #[error("Failed to connect to {address}: {reason}")]
    Connect {
        /// `host:port` that was dialed
        address: String,
        /// Why the attempt failed
        reason: String,
    },

    /// Ciphertext length is not a multiple of the AES block size, or is implausibly large
    #[error("Framing error: invalid ciphertext length {0}")]
    Framing(usize),

    /// Decrypted buffer carries an invalid trailing pad byte
    #[error("Padding error: invalid pad length {0}")]
    Padding(u8),

    /// Decrypted payload is not a valid protocol message
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Frame could not be encrypted
    #[error("Encryption error: {0}")]
    Encrypt(String),

    /// Write failed even after one reconnect-and-resend
    #[error("Send failed: {0}")]
    Send(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SoundbarError {
    /// Whether the error only affects a single frame.
    ///
    /// Malformed wire data is discarded and the receive loop keeps going;
    /// everything else ends the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SoundbarError::Framing(_) | SoundbarError::Padding(_) | SoundbarError::Parse(_)
        )
    }
}
