//! Interleaved vertex buffers of PC and Xbox segments.
//!
//! A `VBUF` payload is a small header (vertex count, stride, attribute flags) followed by
//! `count * stride` bytes of interleaved vertices. Attributes appear in a fixed order and
//! may individually be stored compressed.

use std::mem::size_of;

use anyhow::{ensure, Context, Result};
use bitflags::bitflags;
use zerocopy::{FromBytes, FromZeroes, Unaligned};

use crate::{
    chunk_tags,
    format::{
        msh::SkinEntry,
        ucfb::{ChunkReader, TagReader},
        FourCC, F32, I16, U32,
    },
    util::math::{range_convert, unpack_unorm4x8},
};

// Vertex buffer
pub const K_CHUNK_VBUF: FourCC = FourCC(*b"VBUF");

chunk_tags! {
    Vbuf = K_CHUNK_VBUF;
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct VbufFlags: u32 {
        const POSITION = 0x2;
        const BONE_INDICES = 0x4;
        const BONE_WEIGHTS = 0x8;
        const NORMAL = 0x20;
        const TANGENTS = 0x40;
        const COLOR = 0x80;
        const STATIC_LIGHTING = 0x100;
        const TEXCOORDS = 0x200;
        const POSITION_COMPRESSED = 0x1000;
        const BONE_INFO_COMPRESSED = 0x2000;
        const NORMAL_COMPRESSED = 0x4000;
        const TEXCOORD_COMPRESSED = 0x8000;

        const ATTRIBUTES = Self::POSITION.bits()
            | Self::BONE_INDICES.bits()
            | Self::BONE_WEIGHTS.bits()
            | Self::NORMAL.bits()
            | Self::TANGENTS.bits()
            | Self::COLOR.bits()
            | Self::STATIC_LIGHTING.bits()
            | Self::TEXCOORDS.bits();
    }
}

impl VbufFlags {
    /// Bytes of vertex data the flagged attributes occupy.
    pub fn vertex_size(self) -> usize {
        let pick = |flag, compressed, small, large| -> usize {
            match (self.contains(flag), self.contains(compressed)) {
                (false, _) => 0,
                (true, true) => small,
                (true, false) => large,
            }
        };
        pick(Self::POSITION, Self::POSITION_COMPRESSED, 8, 12)
            + pick(Self::BONE_WEIGHTS, Self::BONE_INFO_COMPRESSED, 4, 8)
            + pick(Self::BONE_INDICES, Self::BONE_INDICES, 4, 4)
            + pick(Self::NORMAL, Self::NORMAL_COMPRESSED, 4, 12)
            + pick(Self::TANGENTS, Self::NORMAL_COMPRESSED, 8, 24)
            + pick(Self::COLOR, Self::COLOR, 4, 4)
            + pick(Self::STATIC_LIGHTING, Self::STATIC_LIGHTING, 4, 4)
            + pick(Self::TEXCOORDS, Self::TEXCOORD_COMPRESSED, 4, 8)
    }

    #[inline]
    pub fn attribute_count(self) -> u32 { (self & Self::ATTRIBUTES).bits().count_ones() }
}

#[derive(Clone, Debug, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct VbufHeader {
    pub count: U32,
    pub stride: U32,
    pub flags: U32,
}

/// Per-vertex data decoded from one or more vertex buffers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texture_coords: Vec<[f32; 2]>,
    pub colours: Vec<[f32; 4]>,
    pub skin: Vec<SkinEntry>,
    pub pretransformed: bool,
}

/// Decodes the vertex buffers of a segment.
pub trait VertexBufferDecoder {
    /// Decodes the full set of buffers of a PC segment.
    fn decode_pc(
        &self,
        vbufs: &[TagReader<Vbuf>],
        vertex_box: &[[f32; 3]; 2],
    ) -> Result<VertexData>;

    /// Decodes the single buffer of an Xbox segment.
    fn decode_xbox(&self, vbuf: TagReader<Vbuf>, vertex_box: &[[f32; 3]; 2])
        -> Result<VertexData>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct StockVertexDecoder;

impl VertexBufferDecoder for StockVertexDecoder {
    fn decode_pc(
        &self,
        vbufs: &[TagReader<Vbuf>],
        vertex_box: &[[f32; 3]; 2],
    ) -> Result<VertexData> {
        // Every buffer of a segment holds the same vertices, laid out for a different shader
        // path; keep the one with the most information.
        let mut best: Option<(&TagReader<Vbuf>, u32)> = None;
        for vbuf in vbufs {
            let mut probe = vbuf.clone();
            let flags = VbufFlags::from_bits_retain(probe.read::<VbufHeader>()?.flags.get());
            let count = flags.attribute_count();
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((vbuf, count));
            }
        }
        match best {
            Some((vbuf, _)) => decode_vbuf(&mut vbuf.clone(), vertex_box),
            None => Ok(VertexData::default()),
        }
    }

    fn decode_xbox(
        &self,
        mut vbuf: TagReader<Vbuf>,
        vertex_box: &[[f32; 3]; 2],
    ) -> Result<VertexData> {
        decode_vbuf(&mut vbuf, vertex_box)
    }
}

/// Splits fixed-width fields off the front of one vertex.
struct Fields<'a>(&'a [u8]);

impl<'a> Fields<'a> {
    fn next<T>(&mut self) -> Result<&'a T>
    where T: FromBytes + Unaligned {
        let value = T::ref_from_prefix(self.0).context("Vertex attribute overruns stride")?;
        self.0 = &self.0[size_of::<T>()..];
        Ok(value)
    }

    fn skip(&mut self, amount: usize) -> Result<()> {
        ensure!(amount <= self.0.len(), "Vertex attribute overruns stride");
        self.0 = &self.0[amount..];
        Ok(())
    }
}

fn decode_vbuf(vbuf: &mut ChunkReader, vertex_box: &[[f32; 3]; 2]) -> Result<VertexData> {
    let header = vbuf.read::<VbufHeader>()?;
    let count = header.count.get() as usize;
    let stride = header.stride.get() as usize;
    let flags = VbufFlags::from_bits_retain(header.flags.get());
    ensure!(
        flags.vertex_size() <= stride,
        "Vertex attributes {:?} need {} bytes but stride is {}",
        flags,
        flags.vertex_size(),
        stride
    );
    let total = count.checked_mul(stride).context("Vertex buffer size overflows")?;
    let data = vbuf.read_array::<u8>(total)?;
    log::trace!("VBUF: {count} vertices, stride {stride}, flags {flags:?}");

    let mut out = VertexData {
        pretransformed: flags.contains(VbufFlags::BONE_INDICES),
        ..Default::default()
    };
    if stride == 0 {
        return Ok(out);
    }
    let position_ranges = [0, 1, 2].map(|i| [vertex_box[0][i], vertex_box[1][i]]);
    for vertex in data.chunks_exact(stride) {
        let mut fields = Fields(vertex);
        if flags.contains(VbufFlags::POSITION) {
            let position = if flags.contains(VbufFlags::POSITION_COMPRESSED) {
                let packed = fields.next::<[I16; 4]>()?;
                [0, 1, 2].map(|i| {
                    range_convert(packed[i].get() as f32, [-32768.0, 32767.0], position_ranges[i])
                })
            } else {
                fields.next::<[F32; 3]>()?.map(|v| v.get())
            };
            out.positions.push(position);
        }
        let weights = if flags.contains(VbufFlags::BONE_WEIGHTS) {
            let [w0, w1] = if flags.contains(VbufFlags::BONE_INFO_COMPRESSED) {
                let packed = fields.next::<[u8; 4]>()?;
                [packed[0] as f32 / 255.0, packed[1] as f32 / 255.0]
            } else {
                fields.next::<[F32; 2]>()?.map(|v| v.get())
            };
            Some([w0, w1, 1.0 - w0 - w1])
        } else {
            None
        };
        if flags.contains(VbufFlags::BONE_INDICES) {
            let indices = fields.next::<[u8; 4]>()?;
            out.skin.push(match weights {
                Some(weights) => SkinEntry { bones: [indices[0], indices[1], indices[2]], weights },
                None => SkinEntry::hard(indices[0]),
            });
        }
        if flags.contains(VbufFlags::NORMAL) {
            let normal = if flags.contains(VbufFlags::NORMAL_COMPRESSED) {
                let packed = fields.next::<[u8; 4]>()?;
                [0, 1, 2].map(|i| packed[i] as f32 * 2.0 / 255.0 - 1.0)
            } else {
                fields.next::<[F32; 3]>()?.map(|v| v.get())
            };
            out.normals.push(normal);
        }
        if flags.contains(VbufFlags::TANGENTS) {
            fields.skip(if flags.contains(VbufFlags::NORMAL_COMPRESSED) { 8 } else { 24 })?;
        }
        let colour =
            if flags.contains(VbufFlags::COLOR) { Some(fields.next::<U32>()?.get()) } else { None };
        let lighting = if flags.contains(VbufFlags::STATIC_LIGHTING) {
            Some(fields.next::<U32>()?.get())
        } else {
            None
        };
        // Baked lighting stands in for vertex colour when there is none
        if let Some(packed) = colour.or(lighting) {
            let c = unpack_unorm4x8(packed);
            out.colours.push([c[2], c[1], c[0], c[3]]);
        }
        if flags.contains(VbufFlags::TEXCOORDS) {
            let uv = if flags.contains(VbufFlags::TEXCOORD_COMPRESSED) {
                fields.next::<[I16; 2]>()?.map(|v| v.get() as f32 / 2048.0)
            } else {
                fields.next::<[F32; 2]>()?.map(|v| v.get())
            };
            out.texture_coords.push(uv);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zerocopy::AsBytes;

    use super::*;
    use crate::format::ucfb::tests::chunk;

    fn vbuf(flags: VbufFlags, stride: u32, vertices: &[Vec<u8>]) -> Vec<u8> {
        chunk(b"VBUF", |w| {
            w.write_all(U32::new(vertices.len() as u32).as_bytes())?;
            w.write_all(U32::new(stride).as_bytes())?;
            w.write_all(U32::new(flags.bits()).as_bytes())?;
            for vertex in vertices {
                w.write_all(vertex)?;
            }
            Ok(())
        })
    }

    fn floats(values: &[f32]) -> Vec<u8> { values.iter().flat_map(|v| v.to_le_bytes()).collect() }

    fn reader(data: &[u8]) -> TagReader<Vbuf> {
        TagReader::try_from(ChunkReader::new(data).unwrap()).unwrap()
    }

    const BOX: [[f32; 3]; 2] = [[-1.0, -2.0, -4.0], [1.0, 2.0, 4.0]];

    #[test]
    fn uncompressed_vertices() {
        let flags =
            VbufFlags::POSITION | VbufFlags::NORMAL | VbufFlags::COLOR | VbufFlags::TEXCOORDS;
        assert_eq!(flags.vertex_size(), 36);
        let vertex = |x: f32| {
            let mut v = floats(&[x, 2.0, 3.0, 0.0, 1.0, 0.0]);
            v.extend_from_slice(&0xFF0000FFu32.to_le_bytes());
            v.extend_from_slice(&floats(&[0.25, 0.75]));
            v
        };
        let data = vbuf(flags, 36, &[vertex(1.0), vertex(-1.0)]);
        let out = StockVertexDecoder.decode_xbox(reader(&data), &BOX).unwrap();

        assert_eq!(out.positions, [[1.0, 2.0, 3.0], [-1.0, 2.0, 3.0]]);
        assert_eq!(out.normals, [[0.0, 1.0, 0.0]; 2]);
        assert_eq!(out.colours, [[0.0, 0.0, 1.0, 1.0]; 2]);
        assert_eq!(out.texture_coords, [[0.25, 0.75]; 2]);
        assert!(out.skin.is_empty());
        assert!(!out.pretransformed);
    }

    #[test]
    fn compressed_vertices() {
        let flags = VbufFlags::POSITION
            | VbufFlags::POSITION_COMPRESSED
            | VbufFlags::BONE_INDICES
            | VbufFlags::NORMAL
            | VbufFlags::NORMAL_COMPRESSED
            | VbufFlags::TEXCOORDS
            | VbufFlags::TEXCOORD_COMPRESSED;
        assert_eq!(flags.vertex_size(), 20);
        let mut vertex = vec![];
        for v in [-32768i16, 32767, -32768, 0] {
            vertex.extend_from_slice(&v.to_le_bytes());
        }
        vertex.extend_from_slice(&[7, 0, 0, 0]);
        vertex.extend_from_slice(&[255, 0, 255, 0]);
        for v in [2048i16, -1024] {
            vertex.extend_from_slice(&v.to_le_bytes());
        }
        // Padding past the attributes
        vertex.extend_from_slice(&[0; 4]);
        let data = vbuf(flags, 24, &[vertex]);
        let out = StockVertexDecoder.decode_xbox(reader(&data), &BOX).unwrap();

        assert_eq!(out.positions, [[-1.0, 2.0, -4.0]]);
        assert_eq!(out.normals, [[1.0, -1.0, 1.0]]);
        assert_eq!(out.texture_coords, [[1.0, -0.5]]);
        assert_eq!(out.skin, [SkinEntry::hard(7)]);
        assert!(out.pretransformed);
    }

    #[test]
    fn soft_skin_weights() {
        let flags = VbufFlags::BONE_WEIGHTS | VbufFlags::BONE_INDICES;
        let mut vertex = floats(&[0.5, 0.25]);
        vertex.extend_from_slice(&[1, 2, 3, 0]);
        let data = vbuf(flags, 12, &[vertex]);
        let out = StockVertexDecoder.decode_xbox(reader(&data), &BOX).unwrap();
        assert_eq!(out.skin, [SkinEntry { bones: [1, 2, 3], weights: [0.5, 0.25, 0.25] }]);
    }

    #[test]
    fn stride_too_small() {
        let data = vbuf(VbufFlags::POSITION | VbufFlags::NORMAL, 12, &[floats(&[0.0; 3])]);
        assert!(StockVertexDecoder.decode_xbox(reader(&data), &BOX).is_err());
    }

    #[test]
    fn truncated_buffer() {
        let mut data = vbuf(VbufFlags::POSITION, 12, &[floats(&[0.0; 3]), floats(&[1.0; 3])]);
        // Claim a third vertex that is not there
        data[8] = 3;
        assert!(StockVertexDecoder.decode_xbox(reader(&data), &BOX).is_err());
    }

    #[test]
    fn pc_picks_richest_buffer() {
        let simple = vbuf(VbufFlags::POSITION, 12, &[floats(&[1.0, 1.0, 1.0])]);
        let mut normal = floats(&[2.0, 2.0, 2.0]);
        normal.extend_from_slice(&floats(&[0.0, 0.0, 1.0]));
        let rich = vbuf(VbufFlags::POSITION | VbufFlags::NORMAL, 24, &[normal]);
        let other = vbuf(VbufFlags::POSITION | VbufFlags::TEXCOORDS, 20, &[floats(&[3.0; 5])]);

        let vbufs = [reader(&simple), reader(&rich), reader(&other)];
        let out = StockVertexDecoder.decode_pc(&vbufs, &BOX).unwrap();
        assert_eq!(out.positions, [[2.0; 3]]);
        assert_eq!(out.normals, [[0.0, 0.0, 1.0]]);

        assert_eq!(StockVertexDecoder.decode_pc(&[], &BOX).unwrap(), VertexData::default());
    }
}
