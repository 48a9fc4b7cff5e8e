//! Model chunks and their per-platform segments.

use anyhow::{bail, ensure, Result};
use zerocopy::{FromBytes, FromZeroes, Unaligned};

use crate::{
    chunk_tags,
    format::{
        msh::{Bbox, BuildersMap, Lod, Model, SkinEntry},
        mtrl::{
            read_material, read_render_type, read_render_type_code, Mtrl, Rtyp, K_CHUNK_MTRL,
            K_CHUNK_RTYP,
        },
        ucfb::{ChunkError, ChunkReader, TagReader},
        vbuf::{Vbuf, VertexBufferDecoder, VertexData, K_CHUNK_VBUF},
        FourCC, Platform, F32, I16, I32, U16, U32,
    },
    util::math::{fract, range_convert, unpack_snorm4x8},
};

// Model
pub const K_CHUNK_MODL: FourCC = FourCC(*b"modl");
// Model name
pub const K_CHUNK_NAME: FourCC = FourCC(*b"NAME");
// Vertex remap
pub const K_CHUNK_VRTX: FourCC = FourCC(*b"VRTX");
// Node
pub const K_CHUNK_NODE: FourCC = FourCC(*b"NODE");
// Model/segment info
pub const K_CHUNK_INFO: FourCC = FourCC(*b"INFO");
// Segment
pub const K_CHUNK_SEGM: FourCC = FourCC(*b"segm");
// Material name
pub const K_CHUNK_MNAM: FourCC = FourCC(*b"MNAM");
// Texture name
pub const K_CHUNK_TNAM: FourCC = FourCC(*b"TNAM");
// Index buffer
pub const K_CHUNK_IBUF: FourCC = FourCC(*b"IBUF");
// Parent bone name
pub const K_CHUNK_BNAM: FourCC = FourCC(*b"BNAM");
// Bone map
pub const K_CHUNK_BMAP: FourCC = FourCC(*b"BMAP");
// PS2 strip buffer
pub const K_CHUNK_STRP: FourCC = FourCC(*b"STRP");
// PS2 positions
pub const K_CHUNK_POSI: FourCC = FourCC(*b"POSI");
// PS2 normals
pub const K_CHUNK_NORM: FourCC = FourCC(*b"NORM");
// PS2 texture coordinates
pub const K_CHUNK_TEX0: FourCC = FourCC(*b"TEX0");
// PS2 vertex colours
pub const K_CHUNK_COL0: FourCC = FourCC(*b"COL0");
// PS2 hard skin
pub const K_CHUNK_BONE: FourCC = FourCC(*b"BONE");

chunk_tags! {
    Modl = K_CHUNK_MODL;
    Name = K_CHUNK_NAME;
    Vrtx = K_CHUNK_VRTX;
    Node = K_CHUNK_NODE;
    Info = K_CHUNK_INFO;
    Segm = K_CHUNK_SEGM;
    Mnam = K_CHUNK_MNAM;
    Tnam = K_CHUNK_TNAM;
    Ibuf = K_CHUNK_IBUF;
    Bnam = K_CHUNK_BNAM;
    Bmap = K_CHUNK_BMAP;
    Strp = K_CHUNK_STRP;
    Posi = K_CHUNK_POSI;
    Norm = K_CHUNK_NORM;
    Tex0 = K_CHUNK_TEX0;
    Col0 = K_CHUNK_COL0;
    Bone = K_CHUNK_BONE;
}

/// Tail of the model INFO record shared by both layouts.
#[derive(Clone, Debug, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
struct ModelInfoRecord {
    vertex_box: [[F32; 3]; 2],
    visibility_box: [[F32; 3]; 2],
    unk: I32,
    face_count: U32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelInfo {
    pub vertex_box: [[f32; 3]; 2],
    pub visibility_box: [[f32; 3]; 2],
    pub face_count: u32,
}

impl ModelInfo {
    #[inline]
    pub fn bbox(&self) -> Bbox { Bbox::from_min_max(self.vertex_box[0], self.vertex_box[1]) }
}

fn read_model_name(mut name: TagReader<Name>) -> Result<(String, Lod)> {
    let name = name.read_string()?;
    let (base, lod) = Lod::split_name(&name);
    Ok((base.to_string(), lod))
}

/// The INFO size is the only thing telling the two layouts apart: the newer one has four
/// leading words, the older three.
pub fn read_model_info(mut info: TagReader<Info>) -> Result<ModelInfo> {
    let leading = match info.size() {
        72 => 4,
        68 => 3,
        size => return Err(ChunkError::UnknownInfoLayout { size }.into()),
    };
    info.read_array::<I32>(leading)?;
    let record = info.read::<ModelInfoRecord>()?;
    let vec3 = |v: &[F32; 3]| v.map(|c| c.get());
    Ok(ModelInfo {
        vertex_box: [vec3(&record.vertex_box[0]), vec3(&record.vertex_box[1])],
        visibility_box: [vec3(&record.visibility_box[0]), vec3(&record.visibility_box[1])],
        face_count: record.face_count.get(),
    })
}

/// Decodes one model chunk for `platform` and adds its segments to `builders`.
///
/// Nothing is added unless the whole chunk decodes.
pub fn handle_model(
    mut model: ChunkReader,
    platform: Platform,
    builders: &mut BuildersMap,
    vbuf_decoder: &dyn VertexBufferDecoder,
) -> Result<()> {
    let (name, lod) = read_model_name(model.read_child_strict::<Name>()?)?;
    model.read_child_strict_optional::<Vrtx>()?;
    model.read_child_strict::<Node>()?;
    let info = read_model_info(model.read_child_strict::<Info>()?)?;

    let mut models = vec![];
    while model.has_remaining() {
        let child = model.read_child()?;
        if child.id() != K_CHUNK_SEGM {
            continue;
        }
        let segment = TagReader::<Segm>::try_from(child)?;
        let mut out = match platform {
            Platform::Pc => process_segment_pc(segment, vbuf_decoder, &info)?,
            Platform::Xbox => process_segment_xbox(segment, vbuf_decoder, &info)?,
            Platform::Ps2 => process_segment_ps2(segment, &info)?,
        };
        out.lod = lod;
        if let Some(index) = out.find_invalid_index() {
            bail!(
                "Segment {} of model '{}' indexes vertex {} of {}",
                models.len(),
                name,
                index,
                out.positions.len()
            );
        }
        models.push(out);
    }

    log::debug!("Model '{}' ({}): {} segment(s)", name, lod, models.len());
    let builder = builders.get_or_create(&name);
    builder.set_bbox(info.bbox());
    for out in models {
        builder.add_model(out);
    }
    Ok(())
}

/// Handles the children PC and Xbox segments have in common. Returns false for anything else.
fn read_segment_child(child: &ChunkReader, model: &mut Model) -> Result<bool> {
    match child.id() {
        K_CHUNK_MTRL => {
            read_material(TagReader::<Mtrl>::try_from(child.clone())?, &mut model.material)?
        }
        K_CHUNK_RTYP => {
            read_render_type(TagReader::<Rtyp>::try_from(child.clone())?, &mut model.material)?
        }
        _ => return read_shared_child(child, model),
    }
    Ok(true)
}

/// Handles the children every segment layout shares.
fn read_shared_child(child: &ChunkReader, model: &mut Model) -> Result<bool> {
    let mut child = child.clone();
    match child.id() {
        K_CHUNK_MNAM => {
            let name = child.read_string()?.into_owned();
            model.material.name = name.clone();
            model.name = name;
        }
        K_CHUNK_TNAM => {
            let index = child.read::<U32>()?.get() as usize;
            let texture = child.read_string()?;
            match model.material.textures.get_mut(index) {
                Some(slot) => *slot = Some(texture.into_owned()),
                None => log::debug!("Dropping texture '{texture}' in slot {index}"),
            }
        }
        K_CHUNK_BNAM => model.parent = Some(child.read_string()?.into_owned()),
        K_CHUNK_BMAP => model.bone_map = read_bone_map(TagReader::try_from(child)?)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn read_bone_map(mut bmap: TagReader<Bmap>) -> Result<Vec<u8>> {
    let count = bmap.read::<U32>()?.get() as usize;
    Ok(bmap.read_array::<u8>(count)?.to_vec())
}

fn read_index_buffer(mut ibuf: TagReader<Ibuf>) -> Result<Vec<u16>> {
    let count = ibuf.read::<U32>()?.get() as usize;
    Ok(ibuf.read_array::<U16>(count)?.iter().map(|i| i.get()).collect())
}

fn apply_vertex_data(model: &mut Model, data: VertexData) {
    model.positions = data.positions;
    model.normals = data.normals;
    model.texture_coords = data.texture_coords;
    model.colours = data.colours;
    model.skin = data.skin;
    model.pretransformed = data.pretransformed;
}

fn process_segment_pc(
    mut segment: TagReader<Segm>,
    vbuf_decoder: &dyn VertexBufferDecoder,
    info: &ModelInfo,
) -> Result<Model> {
    let mut model = Model::default();
    let mut vbufs = vec![];
    while segment.has_remaining() {
        let child = segment.read_child()?;
        match child.id() {
            K_CHUNK_IBUF => model.strips.push(read_index_buffer(TagReader::try_from(child)?)?),
            K_CHUNK_VBUF => vbufs.push(TagReader::<Vbuf>::try_from(child)?),
            _ => {
                if !read_segment_child(&child, &mut model)? {
                    log::trace!("Skipping segment child {:?}", child.id());
                }
            }
        }
    }
    apply_vertex_data(&mut model, vbuf_decoder.decode_pc(&vbufs, &info.vertex_box)?);
    Ok(model)
}

fn process_segment_xbox(
    mut segment: TagReader<Segm>,
    vbuf_decoder: &dyn VertexBufferDecoder,
    info: &ModelInfo,
) -> Result<Model> {
    let mut model = Model::default();
    while segment.has_remaining() {
        let child = segment.read_child()?;
        match child.id() {
            K_CHUNK_IBUF => model.strips.push(read_index_buffer(TagReader::try_from(child)?)?),
            K_CHUNK_VBUF => {
                let data = vbuf_decoder.decode_xbox(TagReader::try_from(child)?, &info.vertex_box)?;
                apply_vertex_data(&mut model, data);
            }
            _ => {
                if !read_segment_child(&child, &mut model)? {
                    log::trace!("Skipping segment child {:?}", child.id());
                }
            }
        }
    }
    Ok(model)
}

/// PS2 segments declare their vertex and index counts up front and store each attribute in
/// its own fixed-function buffer.
fn process_segment_ps2(mut segment: TagReader<Segm>, info: &ModelInfo) -> Result<Model> {
    let mut model = Model::default();
    let mut counts = segment.read_child_strict::<Info>()?;
    let vertex_count = counts.read::<U32>()?.get() as usize;
    let index_count = counts.read::<U32>()?.get() as usize;

    while segment.has_remaining() {
        let child = segment.read_child()?;
        match child.id() {
            K_CHUNK_MTRL => read_material(TagReader::try_from(child)?, &mut model.material)?,
            K_CHUNK_RTYP => {
                read_render_type_code(TagReader::try_from(child)?, &mut model.material)?
            }
            K_CHUNK_STRP => {
                model.strips.extend(read_strip_buffer(TagReader::try_from(child)?, index_count)?)
            }
            K_CHUNK_POSI => {
                let posi = TagReader::try_from(child)?;
                model.positions = read_positions(posi, vertex_count, &info.vertex_box)?
            }
            K_CHUNK_NORM => {
                model.normals = read_normals(TagReader::try_from(child)?, vertex_count)?
            }
            K_CHUNK_TEX0 => {
                let tex0 = TagReader::try_from(child)?;
                model.texture_coords = read_texture_coords(tex0, vertex_count)?
            }
            K_CHUNK_COL0 => {
                model.colours = read_colours(TagReader::try_from(child)?, vertex_count)?
            }
            K_CHUNK_BONE => model.skin = read_hard_skin(TagReader::try_from(child)?, vertex_count)?,
            K_CHUNK_BMAP => {
                model.bone_map = read_bone_map(TagReader::try_from(child)?)?;
                model.pretransformed = true;
            }
            _ => {
                if !read_shared_child(&child, &mut model)? {
                    log::trace!("Skipping segment child {:?}", child.id());
                }
            }
        }
    }
    Ok(model)
}

/// Marks the first two indices of each strip in a PS2 strip buffer.
const STRIP_START: u16 = 0x8000;

/// Splits a PS2 strip buffer into its strips, clearing the start markers.
fn read_strip_buffer(mut strp: TagReader<Strp>, index_count: usize) -> Result<Vec<Vec<u16>>> {
    let indices = strp.read_array::<U16>(index_count)?;
    let mut strips = vec![];
    let mut pos = 0;
    while pos < indices.len() {
        ensure!(pos + 1 < indices.len(), "Strip at index {} has a single vertex", pos);
        let mut strip =
            vec![indices[pos].get() & !STRIP_START, indices[pos + 1].get() & !STRIP_START];
        pos += 2;
        while pos < indices.len() && indices[pos].get() & STRIP_START == 0 {
            strip.push(indices[pos].get());
            pos += 1;
        }
        strips.push(strip);
    }
    Ok(strips)
}

/// Positions are 16-bit fixed point spanning the model's vertex box on each axis.
pub fn read_positions(
    mut posi: TagReader<Posi>,
    vertex_count: usize,
    vertex_box: &[[f32; 3]; 2],
) -> Result<Vec<[f32; 3]>> {
    let ranges = [0, 1, 2].map(|i| [vertex_box[0][i], vertex_box[1][i]]);
    Ok(posi
        .read_array::<[U16; 3]>(vertex_count)?
        .iter()
        .map(|p| [0, 1, 2].map(|i| range_convert(p[i].get() as f32, [0.0, 65535.0], ranges[i])))
        .collect())
}

/// Normals are not renormalized.
pub fn read_normals(mut norm: TagReader<Norm>, vertex_count: usize) -> Result<Vec<[f32; 3]>> {
    Ok(norm
        .read_array::<[i8; 3]>(vertex_count)?
        .iter()
        .map(|n| n.map(|c| c as f32 / 127.0))
        .collect())
}

pub fn read_texture_coords(
    mut tex0: TagReader<Tex0>,
    vertex_count: usize,
) -> Result<Vec<[f32; 2]>> {
    Ok(tex0
        .read_array::<[I16; 2]>(vertex_count)?
        .iter()
        .map(|uv| {
            let [u, v] = uv.map(|c| c.get() as f32 / 2048.0);
            [u, 1.0 - fract(v)]
        })
        .collect())
}

/// Colours are packed signed normalized, blue first.
pub fn read_colours(mut col0: TagReader<Col0>, vertex_count: usize) -> Result<Vec<[f32; 4]>> {
    Ok(col0
        .read_array::<U32>(vertex_count)?
        .iter()
        .map(|packed| {
            let c = unpack_snorm4x8(packed.get());
            [c[2], c[1], c[0], c[3]]
        })
        .collect())
}

pub fn read_hard_skin(mut bone: TagReader<Bone>, vertex_count: usize) -> Result<Vec<SkinEntry>> {
    Ok(bone.read_array::<u8>(vertex_count)?.iter().map(|&b| SkinEntry::hard(b)).collect())
}
