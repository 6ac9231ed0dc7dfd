//! virtfs-inspect: Look at a virtual filesystem from the command line.
//!
//! Builds a search path from a config file and/or `--mount` arguments, then
//! lists, prints or locates logical paths. `pack` writes a directory tree
//! into a zip archive that can be mounted later.
//!
//! # Usage
//!
//! ```bash
//! # List the merged root of two mounts
//! virtfs-inspect --mount base --mount patch1.zip ls
//!
//! # Which entry supplies a file?
//! virtfs-inspect --config virtfs.toml which data/units.xml
//!
//! # Build a content pack
//! virtfs-inspect pack assets/ patch2.zip
//! ```

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use virtfs::{Placement, VfsConfig, VirtFs};
use virtfs_zip::PackBuilder;

/// Inspect a virtual filesystem search path.
#[derive(Parser, Debug)]
#[command(name = "virtfs-inspect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config describing mounts and archive scans
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory or zip archive to append to the search path (repeatable)
    #[arg(short, long, value_name = "PATH")]
    mount: Vec<PathBuf>,

    /// Allow symbolic links inside directory mounts
    #[arg(long)]
    permit_links: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the merged children of a logical directory
    Ls {
        #[arg(default_value = "")]
        dir: String,
    },
    /// Print a file from the first entry that has it
    Cat { path: String },
    /// Show which real location supplies a logical path
    Which { path: String },
    /// Write a directory tree into a zip archive
    Pack { source: PathBuf, output: PathBuf },
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    match &args.command {
        Command::Ls { dir } => {
            let vfs = build_vfs(&args);
            if !vfs.is_directory(dir) {
                error!("Not a directory: {}", dir);
                process::exit(1);
            }
            let dirs = vfs.get_dirs(dir);
            for name in vfs.enumerate_files(dir) {
                if dirs.contains(&name) {
                    println!("{}/", name);
                } else {
                    println!("{}", name);
                }
            }
            vfs.deinit();
        }
        Command::Cat { path } => {
            let vfs = build_vfs(&args);
            let data = match vfs.load_file(path) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to read {}: {}", path, e);
                    process::exit(1);
                }
            };
            if let Err(e) = io::stdout().write_all(&data) {
                error!("Failed to write output: {}", e);
                process::exit(1);
            }
            vfs.deinit();
        }
        Command::Which { path } => {
            let vfs = build_vfs(&args);
            match vfs.real_dir(path) {
                Some(real) => println!("{}", real.display()),
                None => {
                    error!("Not found: {}", path);
                    process::exit(1);
                }
            }
            vfs.deinit();
        }
        Command::Pack { source, output } => pack(source, output),
    }
}

/// Initialize a registry and apply the config file and `--mount` roots.
fn build_vfs(args: &Args) -> VirtFs {
    let vfs = VirtFs::new();
    vfs.init();

    if let Some(path) = &args.config {
        let config = match VfsConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = vfs.apply_config(&config) {
            error!("Failed to apply config: {}", e);
            process::exit(1);
        }
    }

    if args.permit_links {
        vfs.permit_links(true);
    }

    for root in &args.mount {
        if let Err(e) = vfs.mount(root, Placement::Append) {
            error!("Failed to mount {}: {}", root.display(), e);
            process::exit(1);
        }
    }

    for mount in vfs.mounts() {
        info!("mounted {} {}", mount.kind, mount.root);
    }
    vfs
}

fn pack(source: &Path, output: &Path) {
    let builder = match PackBuilder::from_dir(source) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read {}: {}", source.display(), e);
            process::exit(1);
        }
    };
    let count = builder.len();
    match builder.write_to(output) {
        Ok(path) => info!("Wrote {} entries to {}", count, path.display()),
        Err(e) => {
            error!("Failed to write archive: {}", e);
            process::exit(1);
        }
    }
}
