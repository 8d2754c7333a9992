//! Big-endian reads over a seekable byte source.

use std::io::{self, Read, Seek, SeekFrom};

pub(crate) fn read_array<const N: usize, R: Read>(src: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read>(src: &mut R) -> io::Result<u8> {
    Ok(read_array::<1, _>(src)?[0])
}

pub(crate) fn read_u16<R: Read>(src: &mut R) -> io::Result<u16> {
    Ok(u16::from_be_bytes(read_array(src)?))
}

pub(crate) fn read_u32<R: Read>(src: &mut R) -> io::Result<u32> {
    Ok(u32::from_be_bytes(read_array(src)?))
}

pub(crate) fn read_u64<R: Read>(src: &mut R) -> io::Result<u64> {
    Ok(u64::from_be_bytes(read_array(src)?))
}

pub(crate) fn skip<R: Seek>(src: &mut R, n: u64) -> io::Result<()> {
    let n = i64::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
    src.seek(SeekFrom::Current(n))?;
    Ok(())
}

pub(crate) fn position<R: Seek>(src: &mut R) -> io::Result<u64> {
    src.stream_position()
}

pub(crate) fn seek_to<R: Seek>(src: &mut R, offset: u64) -> io::Result<()> {
    src.seek(SeekFrom::Start(offset))?;
    Ok(())
}

pub(crate) fn length<R: Seek>(src: &mut R) -> io::Result<u64> {
    let current = src.stream_position()?;
    let end = src.seek(SeekFrom::End(0))?;
    src.seek(SeekFrom::Start(current))?;
    Ok(end)
}
