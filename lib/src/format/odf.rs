//! Object class chunks, written back out as property sheets.

use anyhow::Result;

use crate::{
    chunk_tags,
    format::{
        ucfb::{ChunkReader, TagReader},
        FourCC, U32,
    },
    util::{
        file::FileSaver,
        hash::{fnv1a_hash, SymbolTable},
    },
};

// Game object class
pub const K_CHUNK_ENTC: FourCC = FourCC(*b"entc");
// Explosion class
pub const K_CHUNK_EXPC: FourCC = FourCC(*b"expc");
// Ordnance class
pub const K_CHUNK_ORDC: FourCC = FourCC(*b"ordc");
// Weapon class
pub const K_CHUNK_WPNC: FourCC = FourCC(*b"wpnc");

// Base class name
pub const K_CHUNK_BASE: FourCC = FourCC(*b"BASE");
// Type name
pub const K_CHUNK_TYPE: FourCC = FourCC(*b"TYPE");
// Property
pub const K_CHUNK_PROP: FourCC = FourCC(*b"PROP");

chunk_tags! {
    Base = K_CHUNK_BASE;
    Type = K_CHUNK_TYPE;
    Prop = K_CHUNK_PROP;
}

pub const GEOMETRY_NAME_HASH: u32 = fnv1a_hash("GeometryName");

/// Section label for an object chunk tag, if it is one.
pub fn object_label(id: FourCC) -> Option<&'static str> {
    match id {
        K_CHUNK_ENTC => Some("GameObjectClass"),
        K_CHUNK_EXPC => Some("ExplosionClass"),
        K_CHUNK_ORDC => Some("OrdnanceClass"),
        K_CHUNK_WPNC => Some("WeaponClass"),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDefinition {
    pub class_name: String,
    pub type_name: String,
    /// `(hash, value)` in file order, duplicates included.
    pub properties: Vec<(u32, String)>,
}

impl ObjectDefinition {
    /// Value of the first geometry property, with the mesh extension added.
    pub fn geometry_name(&self) -> Option<String> {
        self.properties
            .iter()
            .find(|(hash, _)| *hash == GEOMETRY_NAME_HASH)
            .map(|(_, value)| format!("{value}.msh"))
    }

    pub fn to_odf(&self, label: &str, symbols: &SymbolTable) -> String {
        let mut out = String::with_capacity(1024);
        write_section(&mut out, label);
        write_property(&mut out, "ClassLabel", &self.class_name);
        if let Some(geometry) = self.geometry_name() {
            write_property(&mut out, "GeometryName", &geometry);
        }
        out.push('\n');
        write_section(&mut out, "Properties");
        for (hash, value) in &self.properties {
            write_property(&mut out, &symbols.resolve(*hash), value);
        }
        out
    }
}

fn write_section(out: &mut String, name: &str) { out.push_str(&format!("[{name}]\n\n")); }

fn write_property(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("{name} = \"{value}\"\n"));
}

/// Reads the class name, type name and every property of an object chunk.
pub fn read_object(mut object: ChunkReader) -> Result<ObjectDefinition> {
    let class_name = object.read_child_strict::<Base>()?.read_string()?.into_owned();
    let type_name = object.read_child_strict::<Type>()?.read_string()?.into_owned();
    let mut properties = vec![];
    while object.has_remaining() {
        properties.push(read_property(object.read_child_strict::<Prop>()?)?);
    }
    Ok(ObjectDefinition { class_name, type_name, properties })
}

fn read_property(mut prop: TagReader<Prop>) -> Result<(u32, String)> {
    let hash = prop.read::<U32>()?.get();
    let value = prop.read_string()?.into_owned();
    Ok((hash, value))
}

/// Decodes an object chunk and saves it as `<type name>.odf`.
pub fn handle_object(
    object: ChunkReader,
    label: &str,
    saver: &mut dyn FileSaver,
    symbols: &SymbolTable,
) -> Result<()> {
    let definition = read_object(object)?;
    log::debug!(
        "{} '{}': {} properties",
        label,
        definition.type_name,
        definition.properties.len()
    );
    let text = definition.to_odf(label, symbols);
    saver.save(text.as_bytes(), "odf", &definition.type_name, "odf")?;
    Ok(())
}
