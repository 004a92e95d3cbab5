use std::io::{Read, Write};

use crate::{ProtocolError, REPLY_MAX, REQUEST_MAX};

pub fn read_request(reader: &mut impl Read) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix)?;
    let count = u16::from_ne_bytes(prefix);
    if count == 0 || count as usize >= REQUEST_MAX {
        return Err(ProtocolError::InvalidLength(count));
    }
    let mut payload = vec![0u8; count as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_reply(writer: &mut impl Write, payload: &[u8]) -> std::io::Result<()> {
    let count = payload.len().min(REPLY_MAX);
    writer.write_all(&(count as u16).to_ne_bytes())?;
    writer.write_all(&payload[..count])
}
