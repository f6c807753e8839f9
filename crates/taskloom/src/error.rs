//! Runtime error taxonomy

/// Errors surfaced by the runtime
///
/// Resource-creation failures are recovered locally whenever a working
/// fallback exists; they only reach the caller when none does. Nothing in
/// this crate retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Allocation failure
    #[error("Out of memory")]
    OutOfMemory,

    /// No worker thread exists and none could be spawned
    #[error("Out of resources: no worker thread available")]
    OutOfResources,

    /// Malformed handle or argument, or a handle that was already torn down
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A process-wide default was configured after it had been created
    #[error("Already initialized")]
    AlreadyInitialized,

    /// A process-wide default was queried before it had been created
    #[error("Not initialized")]
    NotInitialized,

    /// Requested flag combination is not implemented
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Object, pool or group has already been released
    #[error("Object has been shut down")]
    ShutDown,

    /// Operating system refused to create a thread
    #[error("Thread spawn failed: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Runtime result
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::InvalidArgument`]
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::invalid("timer already deleted").to_string(),
            "Invalid argument: timer already deleted"
        );
        assert_eq!(Error::ShutDown.to_string(), "Object has been shut down");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads");
        let err: Error = io.into();
        assert!(matches!(err, Error::ThreadSpawn(_)));
    }
}
