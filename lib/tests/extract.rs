use std::io::{Cursor, Write};

use anyhow::Result;
use mungelib::{
    extract::{ExtractStats, Extractor},
    format::{
        chunk::ChunkDescriptor,
        msh::{Bbox, BuildersMap, Lod},
        ucfb::{ChunkReader, TagReader},
        vbuf::{Vbuf, VertexBufferDecoder, VertexData},
        FourCC, Platform,
    },
    util::{
        file::MemoryFileSaver,
        hash::{fnv1a_hash, SymbolTable},
    },
};
use pretty_assertions::assert_eq;

/// Builds a chunk from already serialized children or raw payload bytes.
fn chunk(id: &[u8; 4], parts: &[&[u8]]) -> Vec<u8> {
    let mut w = Cursor::new(Vec::new());
    ChunkDescriptor::new(FourCC(*id), 0)
        .write(&mut w, |w| {
            for part in parts {
                w.write_all(part)?;
            }
            Ok(())
        })
        .unwrap();
    let mut data = w.into_inner();
    while data.len() % 4 != 0 {
        data.push(0);
    }
    data
}

fn string(id: &[u8; 4], value: &str) -> Vec<u8> { chunk(id, &[value.as_bytes(), b"\0"]) }

fn words(values: &[u32]) -> Vec<u8> { values.iter().flat_map(|v| v.to_le_bytes()).collect() }

fn model_info(vertex_box: [[f32; 3]; 2]) -> Vec<u8> {
    let mut payload = vec![0u8; 16];
    for v in vertex_box.iter().chain(vertex_box.iter()).flatten() {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    payload.extend_from_slice(&words(&[0, 1]));
    chunk(b"INFO", &[&payload])
}

fn ps2_model(name: &str, vertex_box: [[f32; 3]; 2]) -> Vec<u8> {
    let posi: Vec<u8> =
        [0u16, 0, 0, 65535, 0, 0, 0, 65535, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let tex0: Vec<u8> = [0i16, 0, 2048, 0, 0, 2048].iter().flat_map(|v| v.to_le_bytes()).collect();
    let strp: Vec<u8> = [0u16, 1, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
    let segment = chunk(b"segm", &[
        &chunk(b"INFO", &[&words(&[3, 3])]),
        &string(b"MNAM", "hull"),
        &chunk(b"POSI", &[&posi]),
        &chunk(b"NORM", &[&[0, 0, 127, 0, 0, 127, 0, 0, 127]]),
        &chunk(b"TEX0", &[&tex0]),
        &chunk(b"STRP", &[&strp]),
    ]);
    chunk(b"modl", &[
        &string(b"NAME", name),
        &string(b"NODE", "root"),
        &model_info(vertex_box),
        &segment,
    ])
}

fn object() -> Vec<u8> {
    let prop = |name: &str, value: &str| {
        chunk(b"PROP", &[&fnv1a_hash(name).to_le_bytes(), value.as_bytes(), b"\0"])
    };
    chunk(b"entc", &[
        &string(b"BASE", "soldier"),
        &string(b"TYPE", "rep_inf_trooper"),
        &prop("GeometryName", "mesh01"),
        &prop("MaxHealth", "300"),
    ])
}

fn run(file: &[u8], platform: Platform) -> Result<(ExtractStats, BuildersMap, MemoryFileSaver)> {
    let mut saver = MemoryFileSaver::default();
    let mut extractor = Extractor::new(platform, &mut saver, SymbolTable::default());
    let stats = extractor.process(ChunkReader::new(file)?)?;
    let builders = extractor.into_builders();
    Ok((stats, builders, saver))
}

#[test]
fn object_to_property_sheet() {
    let file = chunk(b"ucfb", &[&object()]);
    let (stats, builders, saver) = run(&file, Platform::Pc).unwrap();
    assert_eq!(stats, ExtractStats { decoded: 1, fallback: 0, failed: 0 });
    assert!(builders.is_empty());

    let odf = saver.find("odf", "rep_inf_trooper.odf").unwrap();
    assert_eq!(
        String::from_utf8_lossy(&odf.data),
        "[GameObjectClass]\n\nClassLabel = \"soldier\"\nGeometryName = \"mesh01.msh\"\n\n\
         [Properties]\n\nGeometryName = \"mesh01\"\nMaxHealth = \"300\"\n"
    );
}

#[test]
fn ps2_model_to_registry() {
    let vertex_box = [[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]];
    let file = chunk(b"ucfb", &[&ps2_model("walkerLOWD", vertex_box)]);
    let (stats, builders, _) = run(&file, Platform::Ps2).unwrap();
    assert_eq!(stats.decoded, 1);

    let builder = builders.get("walker").unwrap();
    assert_eq!(builder.models().len(), 1);
    let model = &builder.models()[0];
    assert_eq!(model.name, "hull");
    assert_eq!(model.lod, Lod::LowRes);
    assert_eq!(model.positions, [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [-1.0, 1.0, -1.0]]);
    assert_eq!(model.normals, [[0.0, 0.0, 1.0]; 3]);
    assert_eq!(model.texture_coords, [[0.0, 1.0], [1.0, 1.0], [0.0, 1.0]]);
    assert_eq!(model.strips, [vec![0, 1, 2]]);
    assert!(!model.pretransformed);
}

#[test]
fn first_bbox_wins() {
    let first = [[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]];
    let second = [[0.0; 3], [8.0; 3]];
    let file = chunk(b"ucfb", &[&ps2_model("walker", first), &ps2_model("walkerLOD1", second)]);
    let (stats, builders, _) = run(&file, Platform::Ps2).unwrap();
    assert_eq!(stats.decoded, 2);

    let builder = builders.get("walker").unwrap();
    assert_eq!(builder.bbox(), Some(&Bbox::from_min_max(first[0], first[1])));
    let lods: Vec<_> = builder.models().iter().map(|m| m.lod).collect();
    assert_eq!(lods, [Lod::Zero, Lod::One]);
}

#[test]
fn malformed_chunk_is_saved_verbatim() {
    // A BASE with no TYPE after it
    let broken = chunk(b"wpnc", &[&string(b"BASE", "rifle")]);
    let unknown = chunk(b"lght", &[b"sun\0"]);
    let file = chunk(b"ucfb", &[&broken, &object(), &unknown]);
    let (stats, _, saver) = run(&file, Platform::Pc).unwrap();
    assert_eq!(stats, ExtractStats { decoded: 1, fallback: 2, failed: 0 });

    let saved = saver.find("munged", "chunk_0.munged").unwrap();
    assert_eq!(&saved.data[..4], b"ucfb");
    let root = ChunkReader::new(&saved.data).unwrap();
    assert_eq!(root.clone().read_child().unwrap().id(), *b"wpnc");
    assert!(saver.find("munged", "chunk_1.munged").is_some());
    assert!(saver.find("odf", "rep_inf_trooper.odf").is_some());
}

#[test]
fn truncated_child_stops_iteration() {
    let mut file = chunk(b"ucfb", &[&object(), &string(b"lght", "sun")]);
    // Claim the last child is longer than the root
    let last = file.len() - 12;
    file[last + 4..last + 8].copy_from_slice(&64u32.to_le_bytes());
    let (stats, _, _) = run(&file, Platform::Pc).unwrap();
    assert_eq!(stats, ExtractStats { decoded: 1, fallback: 0, failed: 1 });
}

/// Reports one vertex per buffer without looking at the data.
struct CountingDecoder;

impl VertexBufferDecoder for CountingDecoder {
    fn decode_pc(&self, vbufs: &[TagReader<Vbuf>], _: &[[f32; 3]; 2]) -> Result<VertexData> {
        Ok(VertexData {
            positions: vec![[0.0; 3]; vbufs.len()],
            pretransformed: true,
            ..Default::default()
        })
    }

    fn decode_xbox(&self, _: TagReader<Vbuf>, _: &[[f32; 3]; 2]) -> Result<VertexData> {
        Ok(VertexData::default())
    }
}

#[test]
fn custom_vertex_decoder() {
    let segment = chunk(b"segm", &[&chunk(b"VBUF", &[b"opaque"]), &chunk(b"VBUF", &[b"data"])]);
    let model = chunk(b"modl", &[
        &string(b"NAME", "turret"),
        &string(b"NODE", "root"),
        &model_info([[-1.0; 3], [1.0; 3]]),
        &segment,
    ]);
    let file = chunk(b"ucfb", &[&model]);

    let mut saver = MemoryFileSaver::default();
    let mut extractor = Extractor::new(Platform::Pc, &mut saver, SymbolTable::empty())
        .with_vbuf_decoder(Box::new(CountingDecoder));
    let stats = extractor.process(ChunkReader::new(&file).unwrap()).unwrap();
    assert_eq!(stats.decoded, 1);

    let model = &extractor.builders().get("turret").unwrap().models()[0];
    assert_eq!(model.positions.len(), 2);
    assert!(model.pretransformed);
}

#[test]
fn root_must_be_container() {
    let file = object();
    assert!(run(&file, Platform::Pc).is_err());
}
