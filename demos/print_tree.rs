// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::{fs::File, path::PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;

use isofs_core::{
    block::BlockSourceHandle,
    import_image,
    node::Node,
    options::ReadOptions,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    iso_path: PathBuf,
    dir_path: Option<PathBuf>,
}

const INDENT: &str = "  ";

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Warn).env().init()?;

    let args = Args::parse();

    let file = File::open(&args.iso_path).context("could not open ISO image")?;
    let source = BlockSourceHandle::new(file);
    let imported = import_image(source, &ReadOptions::default()).context("could not parse ISO image")?;
    let arena = &imported.arena;
    let root = imported.effective_root(false);

    let start = match &args.dir_path {
        Some(dir_path) => {
            let dir_path = dir_path
                .to_str()
                .ok_or_else(|| anyhow!("{dir_path:?} could not be converted to a UTF-8 string"))?;
            let index = arena
                .find_recursive(root, dir_path.trim_start_matches('/'))
                .map_err(|_| anyhow!("'{dir_path}' does not exist"))?;
            if !matches!(arena.get(index), Node::Dir(_)) {
                bail!("'{dir_path}' is not a directory");
            }
            index
        }
        None => root,
    };

    print_tree(&imported, start, 0);
    Ok(())
}

fn print_tree(imported: &isofs_core::ImportedImage, dir: isofs_core::node::NodeIndex, level: usize) {
    let arena = &imported.arena;
    let Ok(children) = arena.children(dir) else {
        return;
    };
    for &child in children {
        let name = &arena.get(child).attrs().name;
        match arena.get(child) {
            Node::Dir(_) => {
                print!("{}", INDENT.repeat(level));
                println!("- {name}/");
                print_tree(imported, child, level + 1);
            }
            Node::File(_) | Node::Symlink(_) | Node::Special(_) | Node::BootPlaceholder(_) => {
                print!("{}", INDENT.repeat(level));
                println!("- {name}");
            }
        }
    }
}
