use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use volimport_shared::constants::envs as const_envs;

use crate::commands;

#[derive(Parser, Debug)]
#[command(
    name = "volimport",
    version,
    about = "Import virtual machine disk images into storage volumes"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Write logs to daily rotated files in this directory instead of stderr
    #[arg(long, global = true, env = const_envs::LOG_DIR)]
    pub log_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// qemu-img binary used for inspection, conversion and resizing
    #[arg(long, global = true, env = const_envs::QEMU_IMG, default_value = "qemu-img")]
    pub qemu_img: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a disk image into the destination volume
    Import(commands::import::ImportArgs),

    /// Continue a paused import from its resume file
    Resume(commands::resume::ResumeArgs),

    /// Filesystem overhead arithmetic
    Space(commands::space::SpaceArgs),
}
