use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use mungelib::{
    format::ucfb::{dump_chunk, ChunkReader},
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print the chunk tree of a munged file
#[argh(subcommand, name = "dump")]
pub struct Args {
    #[argh(positional)]
    /// input munged file
    input: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let data = map_file(&args.input)?;
    let root = ChunkReader::new(&data)
        .with_context(|| format!("Invalid munged file '{}'", args.input.display()))?;
    let mut out = Vec::new();
    dump_chunk(&mut out, &root, 0)?;
    for line in String::from_utf8_lossy(&out).lines() {
        log::info!("{line}");
    }
    Ok(())
}
