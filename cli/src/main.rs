#![deny(clippy::all)]

use anyhow::Context;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::{fs, process};
use structopt::StructOpt;
use wat::parser::IncludeResolver;

/// Compiles and runs a WAT source file.
#[derive(Debug, StructOpt)]
#[structopt(name = "compiler")]
struct Opt {
    /// Path to the source code file.
    #[structopt(parse(from_os_str))]
    source_path: PathBuf,
}

/// Resolves `#include "path"` against the directory the top-level source
/// file lives in, the way a C preprocessor resolves quoted includes.
struct FsIncludes {
    base_dir: PathBuf,
}

impl IncludeResolver for FsIncludes {
    fn resolve(&self, path: &str) -> Result<String, String> {
        fs::read_to_string(self.base_dir.join(path)).map_err(|e| e.to_string())
    }
}

fn run(opt: Opt) -> anyhow::Result<Vec<String>> {
    let source = fs::read_to_string(&opt.source_path)
        .with_context(|| format!("failed to read {:?}", opt.source_path))?;
    let file = opt
        .source_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let base_dir = opt
        .source_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let resolver = FsIncludes { base_dir };

    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .context("failed to read stdin")?;

    match wat::compile_and_run(&source, &file, &resolver, input) {
        Ok(outcome) => {
            io::stdout()
                .write_all(&outcome.output)
                .context("failed to write to stdout")?;
            Ok(Vec::new())
        }
        Err(err) => Ok(err.diagnostics()),
    }
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(diagnostics) if diagnostics.is_empty() => 0,
        Ok(diagnostics) => {
            for line in diagnostics {
                eprintln!("{}", line);
            }
            1
        }
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
