//! glTF output for decoded models.

use std::{collections::BTreeMap, io::Cursor};

use anyhow::Result;
use binrw::{BinResult, BinWriterExt};
use gltf_json::{self as json, validation::USize64};
use json::validation::Checked::Valid;
use mungelib::{
    format::msh::{Builder, Lod, Material, Model, RenderFlags},
    util::file::FileSaver,
};
use serde_json::json;

/// Accumulates the binary buffer and the views and accessors into it.
#[derive(Default)]
struct BufferWriter {
    bin: Cursor<Vec<u8>>,
    views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
}

impl BufferWriter {
    fn push_view<CB>(
        &mut self,
        target: json::buffer::Target,
        name: String,
        mut cb: CB,
    ) -> Result<u32>
    where
        CB: FnMut(&mut Cursor<Vec<u8>>) -> BinResult<()>,
    {
        let offset = self.bin.position();
        cb(&mut self.bin)?;
        let length = self.bin.position() - offset;
        // Keep every view four byte aligned
        while self.bin.position() % 4 != 0 {
            self.bin.write_le(&0u8)?;
        }
        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64(length),
            byte_offset: Some(USize64(offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(name),
            target: Some(Valid(target)),
        });
        Ok(self.views.len() as u32 - 1)
    }

    fn push_accessor(
        &mut self,
        view: u32,
        count: usize,
        component_type: json::accessor::ComponentType,
        type_: json::accessor::Type,
        name: String,
    ) -> json::Index<json::Accessor> {
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(view)),
            byte_offset: None,
            count: USize64(count as u64),
            component_type: Valid(json::accessor::GenericComponentType(component_type)),
            extensions: None,
            extras: Default::default(),
            type_: Valid(type_),
            min: None,
            max: None,
            name: Some(name),
            normalized: false,
            sparse: None,
        });
        json::Index::new(self.accessors.len() as u32 - 1)
    }
}

fn lod_suffix(lod: Lod) -> &'static str {
    match lod {
        Lod::Zero => "",
        Lod::One => "_lod1",
        Lod::Two => "_lod2",
        Lod::LowRes => "_lowd",
    }
}

fn convert_material(material: &Material) -> json::Material {
    let (alpha_mode, alpha_cutoff) =
        if material.flags.intersects(RenderFlags::TRANSPARENT | RenderFlags::ADDITIVE) {
            (json::material::AlphaMode::Blend, None)
        } else if material.flags.contains(RenderFlags::HARDEDGED) {
            (json::material::AlphaMode::Mask, Some(json::material::AlphaCutoff(0.5)))
        } else {
            (json::material::AlphaMode::Opaque, None)
        };
    json::Material {
        alpha_cutoff,
        alpha_mode: Valid(alpha_mode),
        double_sided: material.flags.contains(RenderFlags::DOUBLESIDED),
        name: (!material.name.is_empty()).then(|| material.name.clone()),
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            base_color_factor: json::material::PbrBaseColorFactor(material.diffuse_colour),
            base_color_texture: None,
            metallic_factor: json::material::StrengthFactor(0.0),
            roughness_factor: json::material::StrengthFactor(1.0),
            metallic_roughness_texture: None,
            extensions: None,
            extras: None,
        },
        normal_texture: None,
        occlusion_texture: None,
        emissive_texture: None,
        emissive_factor: Default::default(),
        extensions: None,
        extras: None,
    }
}

fn position_bounds(positions: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in positions {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    (min, max)
}

fn convert_model(
    writer: &mut BufferWriter,
    model: &Model,
    name: &str,
    material: u32,
) -> Result<json::Mesh> {
    use json::accessor::{ComponentType, Type};
    use json::buffer::Target::{ArrayBuffer, ElementArrayBuffer};

    let count = model.positions.len();
    let mut attributes = BTreeMap::new();

    let view = writer.push_view(ArrayBuffer, format!("{name} positions"), |w| {
        w.write_le(&model.positions)
    })?;
    let positions = writer.push_accessor(
        view,
        count,
        ComponentType::F32,
        Type::Vec3,
        format!("{name} POSITION"),
    );
    let (min, max) = position_bounds(&model.positions);
    let accessor = &mut writer.accessors[positions.value()];
    accessor.min = Some(json::Value::Array(vec![json!(min[0]), json!(min[1]), json!(min[2])]));
    accessor.max = Some(json::Value::Array(vec![json!(max[0]), json!(max[1]), json!(max[2])]));
    attributes.insert(Valid(json::mesh::Semantic::Positions), positions);

    if model.normals.len() == count {
        let view = writer.push_view(ArrayBuffer, format!("{name} normals"), |w| {
            w.write_le(&model.normals)
        })?;
        let accessor = writer.push_accessor(
            view,
            count,
            ComponentType::F32,
            Type::Vec3,
            format!("{name} NORMAL"),
        );
        attributes.insert(Valid(json::mesh::Semantic::Normals), accessor);
    }
    if model.texture_coords.len() == count {
        let view = writer.push_view(ArrayBuffer, format!("{name} texcoords"), |w| {
            w.write_le(&model.texture_coords)
        })?;
        let accessor = writer.push_accessor(
            view,
            count,
            ComponentType::F32,
            Type::Vec2,
            format!("{name} TEXCOORD_0"),
        );
        attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), accessor);
    }
    if model.colours.len() == count {
        let view = writer.push_view(ArrayBuffer, format!("{name} colours"), |w| {
            w.write_le(&model.colours)
        })?;
        let accessor = writer.push_accessor(
            view,
            count,
            ComponentType::F32,
            Type::Vec4,
            format!("{name} COLOR_0"),
        );
        attributes.insert(Valid(json::mesh::Semantic::Colors(0)), accessor);
    }

    let mut primitives = Vec::with_capacity(model.strips.len().max(1));
    let primitive = |indices| json::mesh::Primitive {
        attributes: attributes.clone(),
        extensions: None,
        extras: Default::default(),
        indices,
        material: Some(json::Index::new(material)),
        mode: Valid(json::mesh::Mode::TriangleStrip),
        targets: None,
    };
    if model.strips.is_empty() {
        primitives.push(primitive(None));
    }
    for (idx, strip) in model.strips.iter().enumerate() {
        let view = writer.push_view(ElementArrayBuffer, format!("{name} strip {idx}"), |w| {
            w.write_le(strip)
        })?;
        let accessor = writer.push_accessor(
            view,
            strip.len(),
            ComponentType::U16,
            Type::Scalar,
            format!("{name} strip {idx}"),
        );
        primitives.push(primitive(Some(accessor)));
    }

    Ok(json::Mesh {
        extensions: None,
        extras: Default::default(),
        name: Some(name.to_string()),
        primitives,
        weights: None,
    })
}

/// Writes `<name>.bin` and `<name>.gltf` holding every LOD and segment of one model.
pub fn write_builder(saver: &mut dyn FileSaver, name: &str, builder: &Builder) -> Result<()> {
    let mut writer = BufferWriter::default();
    let mut json_materials = Vec::new();
    let mut json_meshes = Vec::new();
    let mut json_nodes = Vec::new();
    let mut json_scene_nodes = Vec::new();

    for (idx, model) in builder.models().iter().enumerate() {
        if model.positions.is_empty() {
            log::debug!("Skipping segment {idx} of '{name}' without vertices");
            continue;
        }
        let base = if model.name.is_empty() { name } else { model.name.as_str() };
        let node_name = format!("{base}{}", lod_suffix(model.lod));

        json_materials.push(convert_material(&model.material));
        let mesh = convert_model(&mut writer, model, &node_name, json_materials.len() as u32 - 1)?;
        json_meshes.push(mesh);
        json_nodes.push(json::Node {
            camera: None,
            children: None,
            extensions: None,
            extras: None,
            matrix: None,
            mesh: Some(json::Index::new(json_meshes.len() as u32 - 1)),
            name: Some(node_name),
            rotation: None,
            scale: None,
            translation: None,
            skin: None,
            weights: None,
        });
        json_scene_nodes.push(json::Index::new(json_nodes.len() as u32 - 1));
    }
    if json_meshes.is_empty() {
        log::warn!("Model '{name}' has no geometry, skipping");
        return Ok(());
    }

    let BufferWriter { bin, views, accessors } = writer;
    let bin = bin.into_inner();
    let bin_name = saver.save(&bin, "msh", name, "bin")?;
    let json_root = json::Root {
        accessors,
        animations: vec![],
        asset: Default::default(),
        buffers: vec![json::Buffer {
            byte_length: bin.len().into(),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: Some(bin_name),
        }],
        buffer_views: views,
        scene: Some(json::Index::new(0)),
        extensions: None,
        extras: Default::default(),
        extensions_used: vec![],
        extensions_required: vec![],
        cameras: vec![],
        images: vec![],
        materials: json_materials,
        meshes: json_meshes,
        nodes: json_nodes,
        samplers: vec![],
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(name.to_string()),
            nodes: json_scene_nodes,
        }],
        skins: vec![],
        textures: vec![],
    };
    let gltf = serde_json::to_vec_pretty(&json_root)?;
    let gltf_name = saver.save(&gltf, "msh", name, "gltf")?;
    log::info!("Wrote {gltf_name}");
    Ok(())
}
