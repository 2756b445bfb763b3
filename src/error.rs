//! Error types for on-disk chain decoding

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Truncated input: {0}")]
    Truncated(String),

    #[error("VarInt overflow: {0}")]
    VarIntOverflow(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    #[error("Malformed index record: {0}")]
    MalformedIndexRecord(String),

    #[error("Malformed undo record: {0}")]
    MalformedUndoRecord(String),

    #[error("Address encoding failed: {0}")]
    AddressEncoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParseError>;
