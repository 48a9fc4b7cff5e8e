use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use mungelib::{
    extract::Extractor,
    format::{ucfb::ChunkReader, Platform},
    util::{
        file::{map_file, DirFileSaver},
        hash::SymbolTable,
    },
};

use crate::gltf::write_builder;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// extract objects and models from a munged file
#[argh(subcommand, name = "extract")]
pub struct Args {
    #[argh(positional)]
    /// input munged file
    input: PathBuf,
    #[argh(positional)]
    /// output directory
    out_dir: PathBuf,
    #[argh(option, default = "Platform::Pc")]
    /// platform the file was munged for: pc, xbox or ps2 (default pc)
    platform: Platform,
    #[argh(option)]
    /// file of additional property names, one per line
    names: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    let mut symbols = SymbolTable::default();
    if let Some(path) = &args.names {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read names from '{}'", path.display()))?;
        symbols.extend(text.lines().map(str::trim).filter(|line| !line.is_empty()));
        log::info!("Loaded {} property names", symbols.len());
    }

    let data = map_file(&args.input)?;
    let root = ChunkReader::new(&data)
        .with_context(|| format!("Invalid munged file '{}'", args.input.display()))?;
    let mut saver = DirFileSaver::new(args.out_dir.clone());
    let mut extractor = Extractor::new(args.platform, &mut saver, symbols);
    extractor.process(root)?;
    let builders = extractor.into_builders();

    for (name, builder) in builders.iter() {
        write_builder(&mut saver, name, builder)
            .with_context(|| format!("Failed to write model '{name}'"))?;
    }
    log::info!("Wrote {} model(s) to '{}'", builders.len(), args.out_dir.display());
    Ok(())
}
