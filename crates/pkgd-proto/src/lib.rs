mod frame;
mod request;

pub use frame::{read_request, write_reply};
pub use request::{encode_reply, tokenize};

use std::io;

use thiserror::Error;

pub const REQUEST_MAX: usize = 1024;
pub const REPLY_MAX: usize = 256;
pub const TOKEN_MAX: usize = 8;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid request length {0}")]
    InvalidLength(u16),
    #[error("request is not ascii text")]
    InvalidEncoding,
    #[error("too many tokens in request")]
    TooManyTokens,
    #[error(transparent)]
    Io(#[from] io::Error),
}
