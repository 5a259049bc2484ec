// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{anyhow, Context};
use clap::Parser;

use isofs_core::{
    block::BlockSourceHandle,
    fsource::{FileSourceIface, IsoFileSource},
    import_image,
    options::ReadOptions,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    iso_path: PathBuf,
    file_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Warn).env().init()?;

    let args = Args::parse();

    let file = File::open(&args.iso_path).context("could not open ISO image")?;
    let source = BlockSourceHandle::new(file);
    let imported = import_image(source, &ReadOptions::default()).context("could not parse ISO image")?;

    let file_path = args
        .file_path
        .to_str()
        .ok_or_else(|| anyhow!("file_path could not be converted to a UTF-8 string"))?;

    let root = imported.effective_root(false);
    let mut reader = IsoFileSource::new(&imported.arena, root);
    reader.open(file_path).map_err(|e| anyhow!("'{file_path}' could not be opened: {e}"))?;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
    }

    Ok(())
}
