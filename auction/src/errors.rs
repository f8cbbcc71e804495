use thiserror::Error;

/// Result type alias for auction-server operations
pub type Result<T, E = AuctionError> = std::result::Result<T, E>;

/// Request- and process-scoped failures.
///
/// Bidder-scoped failures never surface here; they are absorbed into the
/// per-bidder status record so the auction can answer 200 with diagnostics.
#[derive(Error, Debug)]
pub enum AuctionError {
    #[error("Error parsing request: {0}")]
    BadRequest(String),

    #[error("Unknown account id: Unknown account")]
    UnknownAccount,

    #[error("Creative cache failed: {0}")]
    CacheFailure(String),

    #[error("Failed to load bidder param schemas: {0}")]
    SchemaDirectory(String),

    #[error("Account store error: {0}")]
    AccountStore(String),

    #[error("Invalid adapter endpoint for {0}: {1}")]
    AdapterEndpoint(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
