//! Bounds-checked reading of `ucfb` chunk trees.
//!
//! A [`ChunkReader`] is a non-owning view over one chunk. Its only mutable state is the
//! offset of the next unread payload byte; cloning a reader clones that offset, so any
//! number of readers may walk the same buffer independently.
//!
//! Every read advances the head by the size of the value read. Aligned reads (the
//! default) then round the head up to the next multiple of four, relative to the start
//! of the payload; the `_unaligned` variants leave it exactly after the value. Strings
//! and some trailing fields are stored unaligned, so picking the wrong variant
//! desynchronizes every later read in the chunk.

use std::{borrow::Cow, io::Write, marker::PhantomData, mem::size_of, ops::Deref};

use thiserror::Error;
use zerocopy::{FromBytes, Unaligned};

use crate::format::{
    chunk::{ChunkDescriptor, CHUNK_DESCRIPTOR_SIZE},
    FourCC,
};

// Root container
pub const K_CHUNK_UCFB: FourCC = FourCC(*b"ucfb");

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(
        "Read of {amount:#X} bytes at offset {offset:#X} overruns chunk {id} of size {size:#X}"
    )]
    OutOfBounds { id: FourCC, offset: usize, amount: usize, size: usize },
    #[error("Expected chunk {expected}, found {found}")]
    TagMismatch { expected: FourCC, found: FourCC },
    #[error("Chunk {id:?} declares size {size:#X} but only {available:#X} bytes are available")]
    SizeMismatch { id: Option<FourCC>, size: usize, available: usize },
    #[error("Unknown model info layout of size {size:#X}")]
    UnknownInfoLayout { size: usize },
}

/// Marker for a chunk type known at compile time.
pub trait ChunkTag {
    const ID: FourCC;
}

/// Declares uninhabited marker types implementing [`ChunkTag`].
#[macro_export]
macro_rules! chunk_tags {
    ($($(#[$meta:meta])* $name:ident = $id:expr;)*) => {
        $(
            $(#[$meta])*
            #[derive(Copy, Clone, Debug)]
            pub enum $name {}

            impl $crate::format::ucfb::ChunkTag for $name {
                const ID: $crate::format::FourCC = $id;
            }
        )*
    };
}

chunk_tags! {
    Ucfb = K_CHUNK_UCFB;
}

#[derive(Clone, Debug)]
pub struct ChunkReader<'a> {
    id: FourCC,
    data: &'a [u8],
    head: usize,
}

impl<'a> ChunkReader<'a> {
    /// Creates a reader over the chunk at the start of `bytes`.
    ///
    /// Fails with [`ChunkError::SizeMismatch`] when `bytes` is shorter than a header or
    /// than the size the header declares.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ChunkError> {
        let (header, payload, _) = ChunkDescriptor::slice(bytes)?;
        Ok(Self { id: header.id, data: payload, head: 0 })
    }

    #[inline]
    pub fn id(&self) -> FourCC { self.id }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize { self.data.len() }

    #[inline]
    pub fn position(&self) -> usize { self.head }

    #[inline]
    pub fn payload(&self) -> &'a [u8] { self.data }

    /// True while unread payload bytes remain.
    #[inline]
    pub fn has_remaining(&self) -> bool { self.head < self.data.len() }

    #[inline]
    pub fn reset_head(&mut self) { self.head = 0; }

    pub fn read<T>(&mut self) -> Result<&'a T, ChunkError>
    where T: FromBytes + Unaligned {
        self.read_impl(false)
    }

    pub fn read_unaligned<T>(&mut self) -> Result<&'a T, ChunkError>
    where T: FromBytes + Unaligned {
        self.read_impl(true)
    }

    pub fn read_array<T>(&mut self, count: usize) -> Result<&'a [T], ChunkError>
    where T: FromBytes + Unaligned {
        self.read_array_impl(count, false)
    }

    pub fn read_array_unaligned<T>(&mut self, count: usize) -> Result<&'a [T], ChunkError>
    where T: FromBytes + Unaligned {
        self.read_array_impl(count, true)
    }

    /// Reads a null-terminated string. The terminator is consumed but not returned.
    pub fn read_string(&mut self) -> Result<Cow<'a, str>, ChunkError> {
        self.read_string_impl(false)
    }

    pub fn read_string_unaligned(&mut self) -> Result<Cow<'a, str>, ChunkError> {
        self.read_string_impl(true)
    }

    pub fn read_child(&mut self) -> Result<ChunkReader<'a>, ChunkError> {
        self.read_child_impl(false)
    }

    pub fn read_child_unaligned(&mut self) -> Result<ChunkReader<'a>, ChunkError> {
        self.read_child_impl(true)
    }

    /// Reads a child, returning `None` (with the head untouched) instead of failing.
    pub fn read_child_opt(&mut self) -> Option<ChunkReader<'a>> { self.read_child_impl(false).ok() }

    pub fn read_child_unaligned_opt(&mut self) -> Option<ChunkReader<'a>> {
        self.read_child_impl(true).ok()
    }

    /// Reads a child that must be tagged `T`. On a mismatch the head is not moved.
    pub fn read_child_strict<T: ChunkTag>(&mut self) -> Result<TagReader<'a, T>, ChunkError> {
        self.read_child_strict_impl(false)
    }

    pub fn read_child_strict_unaligned<T: ChunkTag>(
        &mut self,
    ) -> Result<TagReader<'a, T>, ChunkError> {
        self.read_child_strict_impl(true)
    }

    /// Reads a child only if it is tagged `T`; otherwise returns `None` without moving
    /// the head. Overrunning the chunk is still an error.
    pub fn read_child_strict_optional<T: ChunkTag>(
        &mut self,
    ) -> Result<Option<TagReader<'a, T>>, ChunkError> {
        match self.read_child_strict_impl(false) {
            Ok(child) => Ok(Some(child)),
            Err(ChunkError::TagMismatch { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn consume(&mut self, amount: usize) -> Result<(), ChunkError> {
        self.take(amount, false).map(|_| ())
    }

    pub fn consume_unaligned(&mut self, amount: usize) -> Result<(), ChunkError> {
        self.take(amount, true).map(|_| ())
    }

    fn read_impl<T>(&mut self, unaligned: bool) -> Result<&'a T, ChunkError>
    where T: FromBytes + Unaligned {
        let offset = self.head;
        let bytes = self.take(size_of::<T>(), unaligned)?;
        T::ref_from(bytes).ok_or_else(|| self.out_of_bounds(offset, size_of::<T>()))
    }

    fn read_array_impl<T>(&mut self, count: usize, unaligned: bool) -> Result<&'a [T], ChunkError>
    where T: FromBytes + Unaligned {
        let offset = self.head;
        let amount = size_of::<T>()
            .checked_mul(count)
            .ok_or_else(|| self.out_of_bounds(offset, usize::MAX))?;
        let bytes = self.take(amount, unaligned)?;
        T::slice_from(bytes).ok_or_else(|| self.out_of_bounds(offset, amount))
    }

    fn read_string_impl(&mut self, unaligned: bool) -> Result<Cow<'a, str>, ChunkError> {
        let remaining = self.data.get(self.head..).unwrap_or_default();
        let Some(length) = remaining.iter().position(|&c| c == 0) else {
            return Err(self.out_of_bounds(self.head, remaining.len() + 1));
        };
        let bytes = self.take(length + 1, unaligned)?;
        Ok(String::from_utf8_lossy(&bytes[..length]))
    }

    fn read_child_impl(&mut self, unaligned: bool) -> Result<ChunkReader<'a>, ChunkError> {
        let offset = self.head;
        let remaining = self.data.get(offset..).unwrap_or_default();
        let header = ChunkDescriptor::ref_from_prefix(remaining)
            .ok_or_else(|| self.out_of_bounds(offset, CHUNK_DESCRIPTOR_SIZE))?;
        let id = header.id;
        let size = header.size.get() as usize;
        let bytes = self.take(CHUNK_DESCRIPTOR_SIZE + size, unaligned)?;
        Ok(ChunkReader { id, data: &bytes[CHUNK_DESCRIPTOR_SIZE..], head: 0 })
    }

    fn read_child_strict_impl<T: ChunkTag>(
        &mut self,
        unaligned: bool,
    ) -> Result<TagReader<'a, T>, ChunkError> {
        let head = self.head;
        let child = self.read_child_impl(unaligned)?;
        match TagReader::try_from(child) {
            Ok(child) => Ok(child),
            Err(e) => {
                self.head = head;
                Err(e)
            }
        }
    }

    fn take(&mut self, amount: usize, unaligned: bool) -> Result<&'a [u8], ChunkError> {
        let start = self.head;
        let end = match start.checked_add(amount) {
            Some(end) if end <= self.data.len() => end,
            _ => return Err(self.out_of_bounds(start, amount)),
        };
        self.head = end;
        if !unaligned {
            self.align_head();
        }
        Ok(&self.data[start..end])
    }

    #[inline]
    fn align_head(&mut self) {
        let remainder = self.head % 4;
        if remainder != 0 {
            self.head += 4 - remainder;
        }
    }

    fn out_of_bounds(&self, offset: usize, amount: usize) -> ChunkError {
        ChunkError::OutOfBounds { id: self.id, offset, amount, size: self.data.len() }
    }
}

/// A reader statically known to carry tag `T`.
#[derive(Clone, Debug)]
pub struct TagReader<'a, T: ChunkTag> {
    reader: ChunkReader<'a>,
    _tag: PhantomData<T>,
}

impl<'a, T: ChunkTag> TagReader<'a, T> {
    #[inline]
    pub fn into_inner(self) -> ChunkReader<'a> { self.reader }
}

impl<'a, T: ChunkTag> TryFrom<ChunkReader<'a>> for TagReader<'a, T> {
    type Error = ChunkError;

    fn try_from(reader: ChunkReader<'a>) -> Result<Self, Self::Error> {
        if reader.id != T::ID {
            return Err(ChunkError::TagMismatch { expected: T::ID, found: reader.id });
        }
        Ok(Self { reader, _tag: PhantomData })
    }
}

impl<'a, T: ChunkTag> Deref for TagReader<'a, T> {
    type Target = ChunkReader<'a>;

    fn deref(&self) -> &Self::Target { &self.reader }
}

impl<'a, T: ChunkTag> std::ops::DerefMut for TagReader<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.reader }
}

/// Parses the payload as a complete sequence of child chunks, if it is one.
fn child_sequence<'a>(reader: &ChunkReader<'a>) -> Option<Vec<ChunkReader<'a>>> {
    let mut reader = reader.clone();
    reader.reset_head();
    let mut children = vec![];
    while reader.has_remaining() {
        let child = reader.read_child_opt()?;
        if !child.id().is_printable() {
            return None;
        }
        children.push(child);
    }
    (!children.is_empty()).then_some(children)
}

/// Recursively dump a chunk and every child chunk it contains
pub fn dump_chunk<W: Write>(w: &mut W, reader: &ChunkReader, indent: usize) -> std::io::Result<()> {
    let indstr = "  ".repeat(indent);
    match child_sequence(reader) {
        Some(children) => {
            writeln!(w, "{indstr}{:?} size {:#X}", reader.id(), reader.size())?;
            for child in &children {
                dump_chunk(w, child, indent + 1)?;
            }
        }
        None => writeln!(w, "{indstr}- {:?} size {:#X}", reader.id(), reader.size())?,
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Cursor, Seek};

    use anyhow::Result;
    use zerocopy::AsBytes;

    use super::*;
    use crate::format::{F32, U16, U32};

    /// Builds a chunk whose payload is written by `cb`.
    pub fn chunk<CB>(id: &[u8; 4], cb: CB) -> Vec<u8>
    where CB: FnMut(&mut Cursor<Vec<u8>>) -> Result<()> {
        let mut w = Cursor::new(Vec::new());
        ChunkDescriptor::new(FourCC(*id), 0).write(&mut w, cb).unwrap();
        w.into_inner()
    }

    /// Builds a chunk with a raw payload, padding it to four bytes like the munger does.
    pub fn raw(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = ChunkDescriptor::new(FourCC(*id), payload.len() as u32).as_bytes().to_vec();
        data.extend_from_slice(payload);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        data
    }

    /// Pads the writer's position to the next multiple of four.
    pub fn align(w: &mut Cursor<Vec<u8>>) -> Result<()> {
        while w.stream_position()? % 4 != 0 {
            w.write_all(&[0])?;
        }
        Ok(())
    }

    fn sample() -> Vec<u8> {
        chunk(b"modl", |w| {
            w.write_all(&raw(b"NAME", b"tank\0"))?;
            w.write_all(&raw(b"INFO", U32::new(7).as_bytes()))?;
            Ok(())
        })
    }

    #[test]
    fn empty_reader_reports_size() {
        let data = raw(b"NODE", &[]);
        let reader = ChunkReader::new(&data).unwrap();
        assert!(!reader.has_remaining());
        assert_eq!(reader.size(), 0);

        let data = raw(b"NODE", &[1]);
        let reader = ChunkReader::new(&data[..9]).unwrap();
        assert!(reader.has_remaining());
    }

    #[test]
    fn construction_checks_declared_size() {
        let data = raw(b"INFO", &[0; 12]);
        assert!(matches!(
            ChunkReader::new(&data[..16]),
            Err(ChunkError::SizeMismatch { size: 12, available: 8, .. })
        ));
        assert!(matches!(ChunkReader::new(&data[..4]), Err(ChunkError::SizeMismatch { .. })));
    }

    #[test]
    fn aligned_and_unaligned_reads() {
        let mut payload = vec![0xAB, 0, 0, 0];
        payload.extend_from_slice(&0x1234u16.to_le_bytes());
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        let data = raw(b"TEST", &payload);
        let mut reader = ChunkReader::new(&data).unwrap();

        assert_eq!(*reader.read_unaligned::<u8>().unwrap(), 0xAB);
        assert_eq!(reader.position(), 1);
        reader.consume(0).unwrap();
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_unaligned::<U16>().unwrap().get(), 0x1234);
        assert_eq!(reader.position(), 6);
        assert_eq!(reader.read_unaligned::<F32>().unwrap().get(), 1.5);
        assert_eq!(reader.position(), 10);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn aligned_reads_leave_head_on_four_bytes() {
        let data = raw(b"TEST", b"ab\0cdefgh\0\0\0\x01\x02\x03");
        let mut reader = ChunkReader::new(&data).unwrap();
        assert_eq!(reader.read_string().unwrap(), "ab");
        assert_eq!(reader.position() % 4, 0);
        assert_eq!(reader.read_string_unaligned().unwrap(), "defgh");
        assert_eq!(reader.position(), 10);
        reader.consume_unaligned(2).unwrap();
        assert_eq!(reader.read_array::<u8>(3).unwrap(), &[1, 2, 3]);
        assert_eq!(reader.position() % 4, 0);
    }

    #[test]
    fn reads_past_the_end_fail() {
        let data = raw(b"TEST", &[1, 2, 3]);
        let mut reader = ChunkReader::new(&data[..11]).unwrap();
        assert!(matches!(
            reader.read::<U32>(),
            Err(ChunkError::OutOfBounds { offset: 0, amount: 4, size: 3, .. })
        ));
        assert!(matches!(reader.read_array::<U16>(2), Err(ChunkError::OutOfBounds { .. })));
        assert!(matches!(reader.read_string(), Err(ChunkError::OutOfBounds { .. })));
        assert!(matches!(reader.consume(4), Err(ChunkError::OutOfBounds { .. })));
        assert!(matches!(reader.read_child(), Err(ChunkError::OutOfBounds { .. })));
        assert!(reader.read_child_opt().is_none());
        // Still usable for inspection
        assert_eq!(reader.id(), *b"TEST");
        assert_eq!(reader.size(), 3);
    }

    #[test]
    fn child_overrunning_parent_fails() {
        let mut child = raw(b"POSI", &[0; 8]);
        child.truncate(12);
        let mut payload = vec![];
        payload.extend_from_slice(&child);
        let data = raw(b"segm", &payload);
        let mut reader = ChunkReader::new(&data).unwrap();
        assert!(matches!(reader.read_child(), Err(ChunkError::OutOfBounds { .. })));
        assert_eq!(reader.position(), 0);
    }

    chunk_tags! {
        Name = FourCC(*b"NAME");
        Info = FourCC(*b"INFO");
        Vrtx = FourCC(*b"VRTX");
    }

    #[test]
    fn strict_child_mismatch_keeps_head() {
        let data = sample();
        let mut reader = ChunkReader::new(&data).unwrap();
        assert!(matches!(
            reader.read_child_strict::<Info>(),
            Err(ChunkError::TagMismatch { expected, found })
                if expected == *b"INFO" && found == *b"NAME"
        ));
        assert_eq!(reader.position(), 0);
        assert!(reader.read_child_strict_optional::<Vrtx>().unwrap().is_none());
        assert_eq!(reader.position(), 0);

        let mut name = reader.read_child_strict::<Name>().unwrap();
        assert_eq!(name.read_string().unwrap(), "tank");
        let mut info = reader.read_child_strict_optional::<Info>().unwrap().unwrap();
        assert_eq!(info.read::<U32>().unwrap().get(), 7);
        assert!(!reader.has_remaining());
        assert!(reader.read_child_strict_optional::<Info>().is_err());
    }

    #[test]
    fn unaligned_children() {
        // A three byte NAME followed directly by an INFO, with no padding in between
        let mut payload = ChunkDescriptor::new(FourCC(*b"NAME"), 3).as_bytes().to_vec();
        payload.extend_from_slice(b"ab\0");
        payload.extend_from_slice(ChunkDescriptor::new(FourCC(*b"INFO"), 2).as_bytes());
        payload.extend_from_slice(&[1, 2]);
        let data = raw(b"segm", &payload);
        let mut reader = ChunkReader::new(&data).unwrap();

        let mut name = reader.read_child_strict_unaligned::<Name>().unwrap();
        assert_eq!(name.read_string_unaligned().unwrap(), "ab");
        assert_eq!(reader.position(), 11);
        assert!(reader.clone().read_child_strict_unaligned::<Vrtx>().is_err());
        let mut info = reader.clone().read_child_unaligned_opt().unwrap();
        assert_eq!(info.read_array_unaligned::<u8>(2).unwrap(), &[1, 2]);
        assert_eq!(reader.read_child_unaligned().unwrap().id(), *b"INFO");
        assert_eq!(reader.position(), 21);
        assert!(reader.read_child_unaligned_opt().is_none());
    }

    #[test]
    fn clones_have_independent_heads() {
        let data = sample();
        let mut reader = ChunkReader::new(&data).unwrap();
        let mut copy = reader.clone();
        reader.read_child().unwrap();
        assert_eq!(copy.position(), 0);
        assert_eq!(copy.read_child().unwrap().id(), *b"NAME");
        reader.reset_head();
        assert_eq!(reader.read_child().unwrap().id(), *b"NAME");
    }

    #[test]
    fn tag_reader_conversion() {
        let data = raw(b"NAME", b"x\0");
        let reader = ChunkReader::new(&data).unwrap();
        assert!(TagReader::<Name>::try_from(reader.clone()).is_ok());
        assert!(matches!(
            TagReader::<Info>::try_from(reader),
            Err(ChunkError::TagMismatch { .. })
        ));
    }

    #[test]
    fn dump_descends_into_containers() {
        let data = sample();
        let reader = ChunkReader::new(&data).unwrap();
        let mut out = Vec::new();
        dump_chunk(&mut out, &reader, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "\"modl\" size 0x1C\n  - \"NAME\" size 0x5\n  - \"INFO\" size 0x4\n");
    }
}
