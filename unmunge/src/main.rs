mod cmd;
mod gltf;

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// Extracts editable assets from munged ucfb game files.
struct TopLevel {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Dump(cmd::dump::Args),
    Extract(cmd::extract::Args),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .format_level(false)
        .init();

    let args: TopLevel = argh::from_env();
    let result = match args.command {
        SubCommand::Dump(args) => cmd::dump::run(args),
        SubCommand::Extract(args) => cmd::extract::run(args),
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
