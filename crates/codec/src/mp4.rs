//! MP4 (ISO base media file format) inspection for AVC and HEVC video tracks.

use crate::Sniffed;
use crate::error::{CodecError, Result};
use crate::source::{length, position, read_array, read_u8, read_u32, read_u64, seek_to, skip};
use crate::video::VideoGeometry;
use std::io::{Read, Seek};
use stow_core::uid::transfer_syntax;

const FORMAT: &str = "MP4";

/// Offset of the child boxes within a visual sample entry, counted from
/// the end of the entry's box header.
const VISUAL_SAMPLE_ENTRY_SIZE: u64 = 78;

/// Byte range of a box payload.
#[derive(Clone, Copy, Debug)]
struct BoxRange {
    kind: [u8; 4],
    start: u64,
    end: u64,
}

/// Decoder configuration of the video track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderConfig {
    Avc { profile: u8, level: u8 },
    Hevc { profile: u8, level: u8 },
}

impl DecoderConfig {
    fn transfer_syntax(self) -> Result<&'static str> {
        match self {
            DecoderConfig::Avc { profile: 100, level } if level <= 41 => {
                Ok(transfer_syntax::MPEG4_HIGH_PROFILE)
            }
            DecoderConfig::Avc { profile: 100, level: 42 } => {
                Ok(transfer_syntax::MPEG4_HIGH_PROFILE_42_2D)
            }
            DecoderConfig::Hevc { profile: 1, .. } => Ok(transfer_syntax::HEVC_MAIN_PROFILE),
            DecoderConfig::Hevc { profile: 2, .. } => Ok(transfer_syntax::HEVC_MAIN10_PROFILE),
            DecoderConfig::Avc { profile, level } => Err(CodecError::unsupported(
                FORMAT,
                format!("AVC profile {profile} level {level}"),
            )),
            DecoderConfig::Hevc { profile, level } => Err(CodecError::unsupported(
                FORMAT,
                format!("HEVC profile {profile} level {level}"),
            )),
        }
    }

    fn bits_stored(self) -> u16 {
        match self {
            DecoderConfig::Hevc { profile: 2, .. } => 10,
            _ => 8,
        }
    }
}

/// What the video track's boxes yield.
#[derive(Debug, Default)]
struct VideoTrack {
    columns: u16,
    rows: u16,
    config: Option<DecoderConfig>,
    timescale: u32,
    duration: u64,
    sample_count: Option<u32>,
}

pub(crate) fn sniff<R: Read + Seek>(src: &mut R) -> Result<Sniffed> {
    let file_end = length(src)?;
    let moov = find_child(src, 0, file_end, b"moov")?
        .ok_or_else(|| CodecError::malformed(FORMAT, "no moov box"))?;

    for trak in children(src, moov.start, moov.end)? {
        if &trak.kind != b"trak" {
            continue;
        }
        if let Some(track) = read_video_track(src, trak)? {
            return into_sniffed(track);
        }
    }
    Err(CodecError::unsupported(FORMAT, "no AVC or HEVC video track"))
}

fn into_sniffed(track: VideoTrack) -> Result<Sniffed> {
    let config = track
        .config
        .ok_or_else(|| CodecError::malformed(FORMAT, "video sample entry without decoder configuration"))?;
    let transfer_syntax_uid = config.transfer_syntax()?;
    if track.rows == 0 || track.columns == 0 {
        return Err(CodecError::malformed(
            FORMAT,
            format!("picture size {}x{}", track.columns, track.rows),
        ));
    }

    let frames = track.sample_count.map(u64::from);
    let frame_rate = match frames {
        Some(frames) if frames > 0 && track.duration > 0 && track.timescale > 0 => {
            Some(frames as f64 * f64::from(track.timescale) / track.duration as f64)
        }
        _ => None,
    };

    let geometry = VideoGeometry {
        rows: track.rows,
        columns: track.columns,
        bits_stored: config.bits_stored(),
        frames,
        frame_rate,
    };
    Ok(Sniffed {
        attributes: geometry.into_attributes(),
        transfer_syntax_uid: Some(transfer_syntax_uid.to_string()),
    })
}

/// Walk `trak/mdia/(mdhd, minf/stbl/(stsd, stsz))`. Returns `None` for non-video tracks.
fn read_video_track<R: Read + Seek>(src: &mut R, trak: BoxRange) -> Result<Option<VideoTrack>> {
    let Some(mdia) = find_child(src, trak.start, trak.end, b"mdia")? else {
        return Ok(None);
    };
    let Some(stbl) = find_path(src, mdia, &[b"minf", b"stbl"])? else {
        return Ok(None);
    };
    let Some(stsd) = find_child(src, stbl.start, stbl.end, b"stsd")? else {
        return Ok(None);
    };

    let mut track = VideoTrack::default();
    if !read_sample_description(src, stsd, &mut track)? {
        return Ok(None);
    }
    if let Some(mdhd) = find_child(src, mdia.start, mdia.end, b"mdhd")? {
        read_media_header(src, mdhd, &mut track)?;
    }
    if let Some(stsz) = find_child(src, stbl.start, stbl.end, b"stsz")? {
        seek_to(src, stsz.start)?;
        skip(src, 8)?; // version, flags, sample_size
        track.sample_count = Some(read_u32(src)?);
    }
    Ok(Some(track))
}

/// Read the first sample entry; returns false unless it is an AVC or HEVC visual entry.
fn read_sample_description<R: Read + Seek>(
    src: &mut R,
    stsd: BoxRange,
    track: &mut VideoTrack,
) -> Result<bool> {
    seek_to(src, stsd.start)?;
    skip(src, 4)?; // version, flags
    if read_u32(src)? == 0 {
        return Ok(false);
    }
    let entry_start = position(src)?;
    let Some(entry) = read_box_header(src, entry_start, stsd.end)? else {
        return Ok(false);
    };
    let is_avc = matches!(&entry.kind, b"avc1" | b"avc3");
    let is_hevc = matches!(&entry.kind, b"hvc1" | b"hev1");
    if !is_avc && !is_hevc {
        return Ok(false);
    }
    if entry.end < entry.start + VISUAL_SAMPLE_ENTRY_SIZE {
        return Err(CodecError::malformed(FORMAT, "visual sample entry too short"));
    }

    seek_to(src, entry.start + 24)?;
    track.columns = u16::from_be_bytes(read_array(src)?);
    track.rows = u16::from_be_bytes(read_array(src)?);

    let children_start = entry.start + VISUAL_SAMPLE_ENTRY_SIZE;
    if is_avc && let Some(avcc) = find_child(src, children_start, entry.end, b"avcC")? {
        seek_to(src, avcc.start)?;
        let [_version, profile, _compatibility, level]: [u8; 4] = read_array(src)?;
        track.config = Some(DecoderConfig::Avc { profile, level });
    }
    if is_hevc && let Some(hvcc) = find_child(src, children_start, entry.end, b"hvcC")? {
        seek_to(src, hvcc.start)?;
        let record: [u8; 13] = read_array(src)?;
        track.config = Some(DecoderConfig::Hevc {
            profile: record[1] & 0x1F,
            level: record[12],
        });
    }
    Ok(true)
}

fn read_media_header<R: Read + Seek>(src: &mut R, mdhd: BoxRange, track: &mut VideoTrack) -> Result<()> {
    seek_to(src, mdhd.start)?;
    let version = read_u8(src)?;
    skip(src, 3)?; // flags
    if version == 1 {
        skip(src, 16)?; // creation and modification time
        track.timescale = read_u32(src)?;
        track.duration = read_u64(src)?;
    } else {
        skip(src, 8)?;
        track.timescale = read_u32(src)?;
        track.duration = u64::from(read_u32(src)?);
    }
    Ok(())
}

/// Read a box header at `offset`, bounded by `parent_end`. Returns `None` at the end of the parent.
fn read_box_header<R: Read + Seek>(src: &mut R, offset: u64, parent_end: u64) -> Result<Option<BoxRange>> {
    if offset + 8 > parent_end {
        return Ok(None);
    }
    seek_to(src, offset)?;
    let size = u64::from(read_u32(src)?);
    let kind: [u8; 4] = read_array(src)?;
    let (header_len, size) = match size {
        0 => (8, parent_end - offset),
        1 => (16, read_u64(src)?),
        n => (8, n),
    };
    let end = offset
        .checked_add(size)
        .filter(|end| size >= header_len && *end <= parent_end)
        .ok_or_else(|| {
            CodecError::malformed(
                FORMAT,
                format!(
                    "box {} at offset {offset} has invalid size {size}",
                    String::from_utf8_lossy(&kind)
                ),
            )
        })?;
    Ok(Some(BoxRange {
        kind,
        start: offset + header_len,
        end,
    }))
}

fn children<R: Read + Seek>(src: &mut R, start: u64, end: u64) -> Result<Vec<BoxRange>> {
    let mut out = Vec::new();
    let mut offset = start;
    while let Some(child) = read_box_header(src, offset, end)? {
        offset = child.end;
        out.push(child);
    }
    Ok(out)
}

fn find_child<R: Read + Seek>(
    src: &mut R,
    start: u64,
    end: u64,
    kind: &[u8; 4],
) -> Result<Option<BoxRange>> {
    Ok(children(src, start, end)?
        .into_iter()
        .find(|child| &child.kind == kind))
}

fn find_path<R: Read + Seek>(src: &mut R, parent: BoxRange, path: &[&[u8; 4]]) -> Result<Option<BoxRange>> {
    let mut current = parent;
    for kind in path {
        match find_child(src, current.start, current.end, kind)? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
