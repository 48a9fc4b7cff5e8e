use anyhow::Result;
use bitflags::bitflags;
use zerocopy::{FromBytes, FromZeroes, Unaligned};

use crate::{
    chunk_tags,
    format::{
        msh::{LegacyRenderType, Material, RenderFlags, RenderType},
        ucfb::TagReader,
        FourCC, F32, I32, U32,
    },
    util::math::{range_convert, unpack_unorm4x8},
};

// Material record
pub const K_CHUNK_MTRL: FourCC = FourCC(*b"MTRL");
// Render type override
pub const K_CHUNK_RTYP: FourCC = FourCC(*b"RTYP");

chunk_tags! {
    Mtrl = K_CHUNK_MTRL;
    Rtyp = K_CHUNK_RTYP;
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct MaterialFlags: u32 {
        const NORMAL = 0x1;
        const HARDEDGED = 0x2;
        const TRANSPARENT = 0x4;
        const GLOSSMAP = 0x8;
        const GLOW = 0x10;
        const BUMPMAP = 0x20;
        const ADDITIVE = 0x40;
        const SPECULAR = 0x80;
        const ENV_MAP = 0x100;
        const VERTEX_LIGHTING = 0x200;
        // Named after the msh flag; the in-game effect is unconfirmed.
        const WIREFRAME = 0x800;
        const DOUBLESIDED = 0x10000;
        const SCROLLING = 0x1000000;
        const ENERGY = 0x2000000;
        const ANIMATED = 0x4000000;
        const ATTACHED_LIGHT = 0x8000000;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct LegacyMaterialFlags: u32 {
        const NORMAL = 0x1;
        const HARDEDGED = 0x2;
        const TRANSPARENT = 0x4;
        const SPECULAR = 0x30;
        const ADDITIVE = 0x80;
        const GLOW = 0x100;
        const DETAIL = 0x200;
        const SCROLL = 0x400;
        const REFLECTION = 0x1000;
        const CAMOUFLAGE = 0x2000;
        const REFRACTION = 0x4000;
    }
}

/// Fixed part of the newer material record. A null-terminated attached light name
/// always follows, unaligned, whether or not the flag is set.
#[derive(Clone, Debug, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MaterialInfo {
    pub flags: U32,
    pub diffuse_colour: U32,
    pub specular_colour: U32,
    pub specular_intensity: U32,
    pub params: [U32; 2],
}

pub const MATERIAL_INFO_SIZE: usize = std::mem::size_of::<MaterialInfo>();

/// Decodes a material chunk into `out`.
///
/// There is no version field: older records are variable sized and always smaller than the
/// fixed newer record, so the chunk size alone selects the decoder.
pub fn read_material(mut mtrl: TagReader<Mtrl>, out: &mut Material) -> Result<()> {
    if mtrl.size() < MATERIAL_INFO_SIZE {
        return read_material_legacy(&mut mtrl, out);
    }

    let info = mtrl.read::<MaterialInfo>()?;
    let attached_light = mtrl.read_string_unaligned()?;

    out.diffuse_colour = unpack_unorm4x8(info.diffuse_colour.get());
    out.specular_colour = unpack_unorm4x8(info.specular_colour.get());
    out.specular_value = info.specular_intensity.get() as f32;
    out.params = info.params.map(|p| p.get() as u8);

    let flags = MaterialFlags::from_bits_retain(info.flags.get());
    if flags.contains(MaterialFlags::VERTEX_LIGHTING) {
        out.flags |= RenderFlags::VERTEX_LIGHTING;
    }
    if flags.contains(MaterialFlags::HARDEDGED) {
        out.flags |= RenderFlags::HARDEDGED;
    }
    if flags.contains(MaterialFlags::TRANSPARENT) && !flags.contains(MaterialFlags::DOUBLESIDED) {
        out.flags |= RenderFlags::TRANSPARENT;
    }
    if flags.contains(MaterialFlags::GLOW) {
        out.flags |= RenderFlags::GLOW;
    }
    if flags.contains(MaterialFlags::BUMPMAP) {
        out.render_type = RenderType::Bumpmap;
    }
    if flags.contains(MaterialFlags::ADDITIVE) {
        out.flags |= RenderFlags::ADDITIVE;
    }
    if flags.contains(MaterialFlags::SPECULAR) {
        out.flags |= RenderFlags::SPECULAR;
    }
    if flags.contains(MaterialFlags::ENV_MAP) {
        out.render_type = RenderType::EnvMap;
    }
    if flags.contains(MaterialFlags::WIREFRAME) {
        out.render_type = RenderType::Wireframe;
    }
    if flags.contains(MaterialFlags::DOUBLESIDED) {
        out.flags |= RenderFlags::DOUBLESIDED;
    }
    if flags.contains(MaterialFlags::SCROLLING) {
        out.render_type = RenderType::Scrolling;
    }
    if flags.contains(MaterialFlags::ENERGY) {
        out.render_type = RenderType::Energy;
    }
    if flags.contains(MaterialFlags::ANIMATED) {
        out.render_type = RenderType::Animated;
    }
    if flags.contains(MaterialFlags::ATTACHED_LIGHT) {
        out.attached_light = Some(attached_light.into_owned());
    }
    Ok(())
}

/// Older records: each flag, tested in this order, may pull its own trailing fields.
/// When several flags set the render type, the last one tested wins.
fn read_material_legacy(mtrl: &mut TagReader<Mtrl>, out: &mut Material) -> Result<()> {
    let flags = LegacyMaterialFlags::from_bits_retain(mtrl.read::<U32>()?.get());

    if flags.contains(LegacyMaterialFlags::HARDEDGED) {
        out.flags |= RenderFlags::HARDEDGED;
    }
    if flags.contains(LegacyMaterialFlags::TRANSPARENT) {
        out.flags |= RenderFlags::TRANSPARENT;
    }
    if flags.contains(LegacyMaterialFlags::SPECULAR) {
        out.legacy_render_type = LegacyRenderType::Specular;
        out.specular_value = mtrl.read::<I32>()?.get() as f32;
        out.specular_colour = unpack_unorm4x8(mtrl.read::<U32>()?.get());
    }
    if flags.contains(LegacyMaterialFlags::ADDITIVE) {
        out.flags |= RenderFlags::ADDITIVE;
    }
    if flags.contains(LegacyMaterialFlags::GLOW) {
        out.legacy_render_type = LegacyRenderType::Glow;
    }
    if flags.contains(LegacyMaterialFlags::DETAIL) {
        out.legacy_render_type = LegacyRenderType::Detail;
        out.params = read_legacy_params(mtrl)?;
    }
    if flags.contains(LegacyMaterialFlags::SCROLL) {
        out.legacy_render_type = LegacyRenderType::Scroll;
        out.params = read_legacy_params(mtrl)?;
    }
    if flags.contains(LegacyMaterialFlags::REFLECTION) {
        out.legacy_render_type = LegacyRenderType::Reflection;
    }
    if flags.contains(LegacyMaterialFlags::CAMOUFLAGE) {
        out.legacy_render_type = LegacyRenderType::Camouflage;
    }
    if flags.contains(LegacyMaterialFlags::REFRACTION) {
        out.legacy_render_type = LegacyRenderType::Refraction;
    }
    Ok(())
}

/// Two floats in [-1, 1], stored as the two's complement byte of [-128, 127].
fn read_legacy_params(mtrl: &mut TagReader<Mtrl>) -> Result<[u8; 2]> {
    let values = mtrl.read_array::<F32>(2)?;
    Ok([0, 1].map(|i| range_convert(values[i].get(), [-1.0, 1.0], [-128.0, 127.0]) as i8 as u8))
}

/// Applies a named render type override.
pub fn read_render_type(mut rtyp: TagReader<Rtyp>, out: &mut Material) -> Result<()> {
    match rtyp.read_string()?.as_ref() {
        "Refraction" => out.render_type = RenderType::Refraction,
        "Bump" => {
            out.legacy_render_type = if out.legacy_render_type == LegacyRenderType::Specular {
                LegacyRenderType::BumpmapSpecular
            } else {
                LegacyRenderType::Bumpmap
            }
        }
        "Water" => out.legacy_render_type = LegacyRenderType::Water,
        other => log::debug!("Ignoring render type '{other}'"),
    }
    Ok(())
}

/// Applies a numeric render type override, as found in PS2 segments.
pub fn read_render_type_code(mut rtyp: TagReader<Rtyp>, out: &mut Material) -> Result<()> {
    let code = rtyp.read::<U32>()?.get();
    match RenderType::from_repr(code) {
        Some(render_type) => out.render_type = render_type,
        None => log::debug!("Ignoring unknown render type {code}"),
    }
    Ok(())
}
