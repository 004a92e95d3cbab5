use crate::{ProtocolError, REPLY_MAX, TOKEN_MAX};

pub fn tokenize(payload: &[u8]) -> Result<Vec<&str>, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidEncoding)?;
    if !text.is_ascii() {
        return Err(ProtocolError::InvalidEncoding);
    }
    let mut tokens = Vec::new();
    for token in text.split_ascii_whitespace() {
        if tokens.len() == TOKEN_MAX {
            return Err(ProtocolError::TooManyTokens);
        }
        tokens.push(token);
    }
    Ok(tokens)
}

pub fn encode_reply(code: i32, extra: &str) -> Vec<u8> {
    let text = if extra.is_empty() {
        code.to_string()
    } else {
        format!("{code} {extra}")
    };
    let mut payload = text.into_bytes();
    payload.truncate(REPLY_MAX);
    payload
}
