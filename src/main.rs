//! # Voxel World Entry Point
//!
//! Headless driver: generates the world around the origin and logs tick reports.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- --settings settings.json --snapshot world.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON settings file (engine tuning and world definition), built-in world if omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Snapshot file loaded before generation (if it exists) and saved afterwards
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    voxel_world::init_logging();

    match voxel_world::run(args.settings.as_deref(), args.snapshot.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_paths_are_optional_flags() {
        let args = Args::try_parse_from(["voxel-world"]).unwrap();
        assert!(args.settings.is_none());
        assert!(args.snapshot.is_none());

        let args = Args::try_parse_from(["voxel-world", "--settings", "a.json", "--snapshot", "b.json"]).unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("a.json")));
        assert_eq!(args.snapshot, Some(PathBuf::from("b.json")));

        assert!(Args::try_parse_from(["voxel-world", "a.json"]).is_err());
    }
}
