use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::error::{FaceAuthError, Result};

/// Default upper bound on a single frame; a handful of encoded photos fit.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// Write `message` as a 4-byte little-endian length followed by its bincode
/// encoding.
pub fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    let data = bincode::serialize(message)
        .map_err(|e| FaceAuthError::Protocol(format!("Failed to serialize message: {}", e)))?;
    let len = u32::try_from(data.len())
        .map_err(|_| FaceAuthError::Protocol(format!("Message too large: {} bytes", data.len())))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame written by [`write_frame`], refusing anything longer than
/// `max_bytes` before allocating for it.
pub fn read_frame<R, T>(reader: &mut R, max_bytes: usize) -> Result<T>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > max_bytes {
        return Err(FaceAuthError::Protocol(format!(
            "Message too large: {} bytes (limit {})", len, max_bytes
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf)
        .map_err(|e| FaceAuthError::Protocol(format!("Failed to deserialize message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_carries_message() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &("hello".to_string(), 7u32)).unwrap();
        assert_eq!(&buf[..4], &((buf.len() - 4) as u32).to_le_bytes());

        let decoded: (String, u32) = read_frame(&mut Cursor::new(buf), 1024).unwrap();
        assert_eq!(decoded, ("hello".to_string(), 7));
    }

    #[test]
    fn oversized_frame_is_rejected_before_reading_body() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(10_000u32).to_le_bytes());
        let err = read_frame::<_, Vec<u8>>(&mut Cursor::new(buf), 1024).unwrap_err();
        assert!(matches!(err, FaceAuthError::Protocol(_)));
    }

    #[test]
    fn truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &vec![1u8; 64]).unwrap();
        buf.truncate(20);
        let err = read_frame::<_, Vec<u8>>(&mut Cursor::new(buf), 1024).unwrap_err();
        assert!(matches!(err, FaceAuthError::Io(_)));
    }
}
