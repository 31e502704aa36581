use thiserror::Error;

/// Client-level error type covering all subsystems.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] gophkeeper_core::crypto::CryptoError),

    #[error(transparent)]
    Core(#[from] gophkeeper_core::error::CoreError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Rpc(tonic::Status),

    #[error("session is no longer authenticated: {0}")]
    Unauthenticated(String),

    #[error("not logged in: run `gophkeeper register` or `gophkeeper auth` first")]
    NotLoggedIn,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("bad resource size: {received} received; {declared} declared")]
    BadLength { received: u64, declared: u64 },

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<ClientError>),
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            // An invalid token is fatal for the session: re-login required.
            tonic::Code::Unauthenticated => {
                ClientError::Unauthenticated(status.message().to_string())
            }
            _ => ClientError::Rpc(status),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

fn format_aggregate(errors: &[ClientError]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} error(s) occurred: {}", errors.len(), rendered.join("; "))
}

/// Convenience alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Fold a list of per-resource errors into a single result.
pub fn aggregate(errors: Vec<ClientError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ClientError::Aggregate(errors))
    }
}
