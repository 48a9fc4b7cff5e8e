use std::{
    io::{Seek, SeekFrom, Write},
    mem::size_of,
};

use anyhow::{ensure, Result};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::format::{ucfb::ChunkError, FourCC, U32};

/// Header preceding every chunk: tag plus payload size (header excluded).
#[derive(Clone, Debug, Default, PartialEq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct ChunkDescriptor {
    pub id: FourCC,
    pub size: U32,
}

pub const CHUNK_DESCRIPTOR_SIZE: usize = size_of::<ChunkDescriptor>();

impl ChunkDescriptor {
    #[inline]
    pub fn new(id: FourCC, size: u32) -> Self { Self { id, size: U32::new(size) } }

    /// Splits `data` into the header, the payload and whatever follows the payload.
    pub fn slice(data: &[u8]) -> Result<(&Self, &[u8], &[u8]), ChunkError> {
        let header = Self::ref_from_prefix(data).ok_or(ChunkError::SizeMismatch {
            id: None,
            size: 0,
            available: data.len(),
        })?;
        let size = header.size.get() as usize;
        let available = data.len() - CHUNK_DESCRIPTOR_SIZE;
        if size > available {
            return Err(ChunkError::SizeMismatch { id: Some(header.id), size, available });
        }
        let (payload, remain) = data[CHUNK_DESCRIPTOR_SIZE..].split_at(size);
        Ok((header, payload, remain))
    }

    /// Writes the header, then the payload produced by `cb`, then patches the size.
    pub fn write<W, CB>(&self, w: &mut W, mut cb: CB) -> Result<()>
    where
        W: Write + Seek,
        CB: FnMut(&mut W) -> Result<()>,
    {
        // Skip over the header
        let chunk_pos = w.stream_position()?;
        let data_pos = chunk_pos + CHUNK_DESCRIPTOR_SIZE as u64;
        w.seek(SeekFrom::Start(data_pos))?;

        // Write the data and determine the size
        cb(w)?;
        let end_pos = w.stream_position()?;
        let size = end_pos - data_pos;
        ensure!(size <= u32::MAX as u64, "Chunk {} too large: {:#X}", self.id, size);

        // Return to the start of the chunk and write the header
        w.seek(SeekFrom::Start(chunk_pos))?;
        let mut out = self.clone();
        out.size.set(size as u32);
        w.write_all(out.as_bytes())?;

        // Seek to the end
        w.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }
}
