//! Normalized model representation shared by every platform decoder.

use bitflags::bitflags;
use indexmap::IndexMap;
use strum::{Display, FromRepr};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Lod {
    #[default]
    Zero,
    One,
    Two,
    #[strum(serialize = "lowd")]
    LowRes,
}

impl Lod {
    /// Splits a trailing LOD marker off a model name.
    pub fn split_name(name: &str) -> (&str, Lod) {
        for (suffix, lod) in [("LOD1", Lod::One), ("LOD2", Lod::Two), ("LOWD", Lod::LowRes)] {
            if let Some(base) = name.strip_suffix(suffix) {
                return (base, lod);
            }
        }
        (name, Lod::Zero)
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct RenderFlags: u8 {
        const HARDEDGED = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const GLOW = 1 << 2;
        const ADDITIVE = 1 << 3;
        const SPECULAR = 1 << 4;
        const DOUBLESIDED = 1 << 5;
        const VERTEX_LIGHTING = 1 << 6;
    }
}

/// Render type of the newer material generation, numbered as in `.msh` files.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromRepr, Display)]
#[repr(u32)]
#[strum(serialize_all = "snake_case")]
pub enum RenderType {
    #[default]
    None = 0,
    Scrolling = 3,
    EnvMap = 6,
    Animated = 7,
    Refraction = 22,
    Wireframe = 24,
    Energy = 25,
    Bumpmap = 27,
}

/// Render type of the older material generation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LegacyRenderType {
    #[default]
    None,
    Specular,
    Glow,
    Detail,
    Scroll,
    Reflection,
    Camouflage,
    Refraction,
    Bumpmap,
    BumpmapSpecular,
    Water,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub flags: RenderFlags,
    pub render_type: RenderType,
    pub legacy_render_type: LegacyRenderType,
    pub diffuse_colour: [f32; 4],
    pub specular_colour: [f32; 4],
    pub specular_value: f32,
    pub params: [u8; 2],
    pub attached_light: Option<String>,
    pub textures: [Option<String>; 4],
    pub name: String,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            flags: RenderFlags::empty(),
            render_type: RenderType::None,
            legacy_render_type: LegacyRenderType::None,
            diffuse_colour: [1.0; 4],
            specular_colour: [1.0; 4],
            specular_value: 50.0,
            params: [0; 2],
            attached_light: None,
            textures: Default::default(),
            name: String::new(),
        }
    }
}

/// Up to three weighted bone references for one vertex.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SkinEntry {
    pub bones: [u8; 3],
    pub weights: [f32; 3],
}

impl SkinEntry {
    /// A vertex bound entirely to one bone.
    #[inline]
    pub fn hard(bone: u8) -> Self { Self { bones: [bone; 3], weights: [1.0, 0.0, 0.0] } }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub name: String,
    pub lod: Lod,
    pub material: Material,
    pub parent: Option<String>,
    pub bone_map: Vec<u8>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texture_coords: Vec<[f32; 2]>,
    pub colours: Vec<[f32; 4]>,
    pub skin: Vec<SkinEntry>,
    pub strips: Vec<Vec<u16>>,
    pub pretransformed: bool,
}

impl Model {
    /// Index of the first strip entry that does not address a vertex, if any.
    pub fn find_invalid_index(&self) -> Option<u16> {
        if self.positions.is_empty() {
            return None;
        }
        let count = self.positions.len();
        self.strips.iter().flatten().copied().find(|&i| i as usize >= count)
    }
}

/// Axis-aligned box stored as centre and half extents.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Bbox {
    pub centre: [f32; 3],
    pub size: [f32; 3],
}

impl Bbox {
    pub fn from_min_max(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            centre: [0, 1, 2].map(|i| (min[i] + max[i]) / 2.0),
            size: [0, 1, 2].map(|i| (min[i] - max[i]).abs() / 2.0),
        }
    }

    pub fn min(&self) -> [f32; 3] { [0, 1, 2].map(|i| self.centre[i] - self.size[i]) }

    pub fn max(&self) -> [f32; 3] { [0, 1, 2].map(|i| self.centre[i] + self.size[i]) }
}

/// Everything decoded for one model name across its LODs.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    bbox: Option<Bbox>,
    models: Vec<Model>,
}

impl Builder {
    /// Sets the bounding box unless one was already set.
    pub fn set_bbox(&mut self, bbox: Bbox) {
        if self.bbox.is_none() {
            self.bbox = Some(bbox);
        }
    }

    pub fn add_model(&mut self, model: Model) { self.models.push(model); }

    pub fn bbox(&self) -> Option<&Bbox> { self.bbox.as_ref() }

    pub fn models(&self) -> &[Model] { &self.models }
}

/// Model builders keyed by base name, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct BuildersMap(IndexMap<String, Builder>);

impl BuildersMap {
    pub fn get_or_create(&mut self, name: &str) -> &mut Builder {
        if !self.0.contains_key(name) {
            self.0.insert(name.to_string(), Builder::default());
        }
        &mut self.0[name]
    }

    pub fn get(&self, name: &str) -> Option<&Builder> { self.0.get(name) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Builder)> {
        self.0.iter().map(|(name, builder)| (name.as_str(), builder))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
