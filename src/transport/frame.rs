use std::io::{self, ErrorKind, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Bytes, BytesMut};

// Frame layout
// len(u64) + payload([u8; len])

/// max frame len
pub const FRAME_MAX_LEN: u64 = 16 * 1024 * 1024;

/// decode one frame from the reader
/// the buf is reused between calls to avoid reallocation
pub fn decode_from<R: Read>(r: &mut R, buf: &mut BytesMut) -> io::Result<Bytes> {
    let len = r.read_u64::<BigEndian>()?;
    debug!("decode len = {:?}", len);

    if len > FRAME_MAX_LEN {
        let s = format!("decode too big frame length. len={len}");
        error!("{s}");
        return Err(io::Error::new(ErrorKind::InvalidInput, s));
    }

    let len = len as usize;
    buf.clear();
    buf.resize(len, 0);
    r.read_exact(&mut buf[..])?;
    Ok(buf.split_to(len).freeze())
}

/// encode the payload into a raw frame that can be sent as is
pub fn encode(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = payload.len() as u64;
    if len > FRAME_MAX_LEN {
        let s = format!("encode too big frame length. len={len}");
        error!("{s}");
        return Err(io::Error::new(ErrorKind::InvalidInput, s));
    }

    let mut data = Vec::with_capacity(payload.len() + 8);
    data.write_u64::<BigEndian>(len)?;
    data.extend_from_slice(payload);
    Ok(data)
}

/// write several frames with a single write call
/// so that frames belong to one message are never interleaved
pub fn write_frames<W: Write>(w: &mut W, payloads: &[&[u8]]) -> io::Result<()> {
    let mut data = Vec::with_capacity(payloads.iter().map(|p| p.len() + 8).sum());
    for payload in payloads {
        data.extend_from_slice(&encode(payload)?);
    }
    w.write_all(&data)?;
    w.flush()
}
