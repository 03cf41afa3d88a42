use thiserror::Error;
use torrent_parser::{
    error::TorrentParserError,
    udp::{ResponseKind, TransactionId},
};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Torrent Parser Error: {0}")]
    TorrentParserError(#[from] TorrentParserError),

    #[error("Transaction Mismatch: expected {expected}, found {found}")]
    TransactionMismatch {
        expected: TransactionId,
        found: TransactionId,
    },

    #[error("Unknown Action: {0:?}")]
    UnknownAction(Option<u32>),

    #[error("Unexpected Response: {0:?} while not awaiting one")]
    UnexpectedResponse(ResponseKind),

    #[error("Tracker Unreachable: no response after {attempts} attempts")]
    TrackerUnreachable { attempts: u32 },

    #[error("Invalid Announce URL: {0}")]
    InvalidAnnounceUrl(String),

    #[error("Unsupported Scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Config Error: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
