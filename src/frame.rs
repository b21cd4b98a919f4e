//! Frame reassembly from a TCP byte stream.
//!
//! ```text
//! +------+----------------+----------------------------+
//! | 0x10 | u32 BE length  | ciphertext (length bytes)  |
//! +------+----------------+----------------------------+
//! ```
//!
//! Bytes before a marker are skipped. A length that is not a multiple of the
//! block size, or that exceeds [`MAX_PAYLOAD_LEN`], is reported as a framing
//! error and scanning resumes at the next marker.

use crate::codec::BLOCK_SIZE;
use crate::error::{Result, SoundbarError};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Start-of-frame marker
pub const FRAME_MARKER: u8 = 0x10;

/// Marker byte plus the 4-byte length
pub const HEADER_LEN: usize = 5;

/// Largest payload the reader accepts without treating the header as garbage
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Read the next frame payload.
///
/// Returns `Ok(None)` once the peer has closed the stream, including a close in
/// the middle of a frame. `Err(SoundbarError::Framing)` is recoverable; the
/// reader is positioned right after the offending header or payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        if byte[0] == FRAME_MARKER {
            break;
        }
        tracing::trace!("Skipping non-marker byte 0x{:02x}", byte[0]);
    }

    let mut len = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len).await? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len) as usize;

    if len > MAX_PAYLOAD_LEN {
        return Err(SoundbarError::Framing(len));
    }

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload).await? {
        return Ok(None);
    }

    if len == 0 || len % BLOCK_SIZE != 0 {
        return Err(SoundbarError::Framing(len));
    }

    Ok(Some(payload))
}

async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
