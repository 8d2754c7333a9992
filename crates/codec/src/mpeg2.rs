//! MPEG-2 video sequence header inspection.

use crate::Sniffed;
use crate::error::{CodecError, Result};
use crate::video::VideoGeometry;
use std::io::{Read, Seek};

const FORMAT: &str = "MPEG-2";

const SEQUENCE_HEADER_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xB3];

/// How far into the stream the sequence header is searched for.
const SEARCH_LIMIT: u64 = 1024 * 1024;

/// Frame rates indexed by `frame_rate_code`.
const FRAME_RATES: [f64; 9] = [
    0.0,
    24000.0 / 1001.0,
    24.0,
    25.0,
    30000.0 / 1001.0,
    30.0,
    50.0,
    60000.0 / 1001.0,
    60.0,
];

pub(crate) fn sniff<R: Read + Seek>(src: &mut R) -> Result<Sniffed> {
    let mut buf = Vec::new();
    src.take(SEARCH_LIMIT).read_to_end(&mut buf)?;

    let start = buf
        .windows(SEQUENCE_HEADER_CODE.len())
        .position(|w| w == SEQUENCE_HEADER_CODE)
        .ok_or_else(|| CodecError::malformed(FORMAT, "no sequence header"))?;
    let header = buf
        .get(start + 4..start + 8)
        .ok_or_else(|| CodecError::malformed(FORMAT, "truncated sequence header"))?;

    let columns = (u16::from(header[0]) << 4) | (u16::from(header[1]) >> 4);
    let rows = ((u16::from(header[1]) & 0x0F) << 8) | u16::from(header[2]);
    let frame_rate_code = usize::from(header[3] & 0x0F);

    if rows == 0 || columns == 0 {
        return Err(CodecError::malformed(
            FORMAT,
            format!("picture size {columns}x{rows}"),
        ));
    }
    let frame_rate = match FRAME_RATES.get(frame_rate_code) {
        Some(rate) if *rate > 0.0 => *rate,
        _ => {
            return Err(CodecError::malformed(
                FORMAT,
                format!("frame rate code {frame_rate_code}"),
            ));
        }
    };

    let geometry = VideoGeometry {
        rows,
        columns,
        bits_stored: 8,
        frames: None,
        frame_rate: Some(frame_rate),
    };
    Ok(Sniffed {
        attributes: geometry.into_attributes(),
        transfer_syntax_uid: None,
    })
}
