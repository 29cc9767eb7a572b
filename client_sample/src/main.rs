//! Applies the userspace bundle patches to a bundle binary on disk, to check which rules
//! match a given OS build.
//!
//! Usage: `client_sample <input> <output> [--ventura] [--model <id>]`
//! Rules missing from the image are logged as warnings. Run with `RUST_LOG=debug` to
//! see every rule that applied.

use std::path::Path;
use std::process::ExitCode;

use apupatch::dyld::{patch_for_path, BUNDLE_PATHS};
use apupatch::patch::apply_all;
use apupatch::DyldEnv;
use log::{error, info};

const DEFAULT_MODEL: &str = "MacBookPro16,3";

struct Args {
    input: String,
    output: String,
    env: DyldEnv,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Args> {
    let input = args.next()?;
    let output = args.next()?;
    let mut ventura_or_newer = false;
    let mut model = String::from(DEFAULT_MODEL);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ventura" => ventura_or_newer = true,
            "--model" => model = args.next()?,
            _ => return None,
        }
    }
    Some(Args {
        input,
        output,
        env: DyldEnv {
            ventura_or_newer,
            model_identifier: model.leak(),
        },
    })
}

/// The system path of the bundle `input` is a copy of, matched by file name.
fn bundle_path(input: &str) -> Option<&'static str> {
    let name = Path::new(input).file_name()?;
    BUNDLE_PATHS
        .into_iter()
        .find(|path| Path::new(path).file_name() == Some(name))
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(args) = parse_args(std::env::args().skip(1)) else {
        error!("Usage: client_sample <input> <output> [--ventura] [--model <id>]");
        return ExitCode::FAILURE;
    };
    let Some(path) = bundle_path(&args.input) else {
        error!("{} is not a bundle we have patches for", args.input);
        return ExitCode::FAILURE;
    };
    let mut image = match std::fs::read(&args.input) {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to read {}: {}", args.input, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Patching {} as {} ({} bytes)", args.input, path, image.len());
    let patched = patch_for_path(path, &mut image, &args.env, apply_all);
    info!("{} rule(s) applied", patched);

    if let Err(e) = std::fs::write(&args.output, &image) {
        error!("Failed to write {}: {}", args.output, e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
