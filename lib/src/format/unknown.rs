use std::io::{Cursor, Write};

use anyhow::Result;

use crate::{
    format::{
        chunk::{ChunkDescriptor, CHUNK_DESCRIPTOR_SIZE},
        ucfb::{ChunkReader, K_CHUNK_UCFB},
    },
    util::file::FileSaver,
};

/// Hands out `chunk_<n>` names for chunks saved without one. Owned by the extraction
/// session, so names restart with every session.
#[derive(Clone, Debug, Default)]
pub struct ChunkNamer {
    next: u64,
}

impl ChunkNamer {
    pub fn next_name(&mut self) -> String {
        let name = format!("chunk_{}", self.next);
        self.next += 1;
        name
    }

    pub fn reset(&mut self) { self.next = 0; }
}

/// Wraps a whole chunk, header included, in a `ucfb` container of its own.
pub fn wrap_chunk(chunk: &ChunkReader) -> Result<Vec<u8>> {
    let mut w = Cursor::new(Vec::with_capacity(chunk.size() + 2 * CHUNK_DESCRIPTOR_SIZE));
    ChunkDescriptor::new(K_CHUNK_UCFB, 0).write(&mut w, |w| {
        ChunkDescriptor::new(chunk.id(), 0).write(w, |w| {
            w.write_all(chunk.payload())?;
            Ok(())
        })
    })?;
    Ok(w.into_inner())
}

/// Saves a chunk nothing else could decode as a standalone munged file.
pub fn handle_unknown(
    chunk: &ChunkReader,
    saver: &mut dyn FileSaver,
    namer: &mut ChunkNamer,
    name: Option<&str>,
) -> Result<String> {
    let data = wrap_chunk(chunk)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => namer.next_name(),
    };
    log::debug!("Saving {:?} chunk as '{}'", chunk.id(), name);
    saver.save(&data, "munged", &name, "munged")
}
