use clap::{Args, Subcommand};
use volimport::Quantity;
use volimport::space::{required_space, usable_space};
use volimport_shared::constants::space::DEFAULT_FILESYSTEM_OVERHEAD;

#[derive(Args, Debug)]
pub struct SpaceArgs {
    #[command(subcommand)]
    pub command: SpaceCommand,
}

#[derive(Subcommand, Debug)]
pub enum SpaceCommand {
    /// Bytes an image may occupy on a volume with AVAILABLE free bytes
    Usable {
        /// Physical space available (e.g. 10Gi)
        available: Quantity,

        /// Fraction reserved for filesystem overhead
        #[arg(long, default_value_t = DEFAULT_FILESYSTEM_OVERHEAD)]
        overhead: f64,
    },

    /// Volume size needed to hold an image of SIZE bytes
    Required {
        /// Logical image size (e.g. 10Gi)
        size: Quantity,

        /// Fraction reserved for filesystem overhead
        #[arg(long, default_value_t = DEFAULT_FILESYSTEM_OVERHEAD)]
        overhead: f64,
    },
}

pub fn execute(args: SpaceArgs) -> anyhow::Result<()> {
    let bytes = match args.command {
        SpaceCommand::Usable {
            available,
            overhead,
        } => usable_space(check_overhead(overhead)?, available.bytes()),
        SpaceCommand::Required { size, overhead } => {
            required_space(check_overhead(overhead)?, size.bytes())
        }
    };
    println!("{}", bytes);
    Ok(())
}

fn check_overhead(overhead: f64) -> anyhow::Result<f64> {
    if !(0.0..=1.0).contains(&overhead) {
        anyhow::bail!("overhead must be between 0 and 1, got {}", overhead);
    }
    Ok(overhead)
}
