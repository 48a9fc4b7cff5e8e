//! One pass over a munged file: every top-level chunk goes to its decoder, and anything that
//! fails to decode is kept verbatim through the fallback.

use anyhow::{ensure, Result};

use crate::{
    format::{
        modl::{handle_model, K_CHUNK_MODL},
        msh::BuildersMap,
        odf::{handle_object, object_label},
        ucfb::{ChunkReader, K_CHUNK_UCFB},
        unknown::{handle_unknown, ChunkNamer},
        vbuf::{StockVertexDecoder, VertexBufferDecoder},
        Platform,
    },
    util::{file::FileSaver, hash::SymbolTable},
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtractStats {
    /// Chunks a decoder handled.
    pub decoded: usize,
    /// Chunks saved verbatim, whether unknown or failed to decode.
    pub fallback: usize,
    /// Chunks lost entirely.
    pub failed: usize,
}

pub struct Extractor<'s> {
    platform: Platform,
    saver: &'s mut dyn FileSaver,
    symbols: SymbolTable,
    namer: ChunkNamer,
    builders: BuildersMap,
    vbuf_decoder: Box<dyn VertexBufferDecoder>,
}

impl<'s> Extractor<'s> {
    pub fn new(platform: Platform, saver: &'s mut dyn FileSaver, symbols: SymbolTable) -> Self {
        Self {
            platform,
            saver,
            symbols,
            namer: ChunkNamer::default(),
            builders: BuildersMap::default(),
            vbuf_decoder: Box::new(StockVertexDecoder),
        }
    }

    pub fn with_vbuf_decoder(mut self, decoder: Box<dyn VertexBufferDecoder>) -> Self {
        self.vbuf_decoder = decoder;
        self
    }

    /// Decodes every chunk of a `ucfb` container.
    ///
    /// Only a root that is not a container fails the whole run; problems with individual
    /// chunks are logged and counted.
    pub fn process(&mut self, mut root: ChunkReader) -> Result<ExtractStats> {
        ensure!(
            root.id() == K_CHUNK_UCFB,
            "Invalid root chunk {:?}, expected {:?}",
            root.id(),
            K_CHUNK_UCFB
        );

        let mut stats = ExtractStats::default();
        while root.has_remaining() {
            let offset = root.position();
            let chunk = match root.read_child() {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::warn!("Stopping at offset {offset:#X}: {e}");
                    stats.failed += 1;
                    break;
                }
            };
            match self.decode(&chunk) {
                Ok(true) => stats.decoded += 1,
                Ok(false) => self.fallback(&chunk, &mut stats),
                Err(e) => {
                    let id = chunk.id();
                    log::warn!("Failed to decode {id:?} chunk at offset {offset:#X}: {e:?}");
                    self.fallback(&chunk, &mut stats);
                }
            }
        }
        log::info!(
            "Decoded {} chunk(s), saved {} verbatim, lost {}",
            stats.decoded,
            stats.fallback,
            stats.failed
        );
        Ok(stats)
    }

    /// Returns false when no decoder handles the chunk.
    fn decode(&mut self, chunk: &ChunkReader) -> Result<bool> {
        let id = chunk.id();
        if id == K_CHUNK_MODL {
            let decoder = self.vbuf_decoder.as_ref();
            handle_model(chunk.clone(), self.platform, &mut self.builders, decoder)?;
        } else if let Some(label) = object_label(id) {
            handle_object(chunk.clone(), label, self.saver, &self.symbols)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn fallback(&mut self, chunk: &ChunkReader, stats: &mut ExtractStats) {
        match handle_unknown(chunk, self.saver, &mut self.namer, None) {
            Ok(_) => stats.fallback += 1,
            Err(e) => {
                log::warn!("Failed to save {:?} chunk: {e:?}", chunk.id());
                stats.failed += 1;
            }
        }
    }

    pub fn builders(&self) -> &BuildersMap { &self.builders }

    pub fn into_builders(self) -> BuildersMap { self.builders }
}
