pub mod import;
pub mod resume;
pub mod space;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use volimport::termination::write_termination_message;
use volimport::{
    DataProcessor, DataProvider, ImageOperations, ImportError, ImportOptions, QemuImg,
    TerminationMessage,
};

use crate::cli::GlobalFlags;

/// Destination and sizing flags shared by `import` and `resume`.
///
/// Values come from the JSON config first, then `VOLIMPORT_*` variables,
/// then these flags.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// JSON file with import options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Destination data file or block device [default: <data-dir>/disk.img]
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Directory on the destination volume
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Scratch directory for sources that need conversion
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Requested final image size (e.g. 10Gi)
    #[arg(long)]
    pub size: Option<String>,

    /// Fraction of the volume reserved for filesystem overhead
    #[arg(long)]
    pub overhead: Option<f64>,

    /// Preallocate the destination image
    #[arg(long)]
    pub preallocate: bool,

    /// Source format passed to the converter instead of detecting it
    #[arg(long)]
    pub source_format: Option<String>,

    /// Write the termination message to this file
    #[arg(long)]
    pub termination_log: Option<PathBuf>,
}

impl TargetArgs {
    pub fn options(&self) -> anyhow::Result<ImportOptions> {
        let base = match &self.config {
            Some(path) => ImportOptions::from_file(path)?,
            None => ImportOptions::default(),
        };
        let mut options = base.apply_env()?;

        if let Some(dest) = &self.dest {
            options.dest = Some(dest.clone());
        }
        if let Some(dir) = &self.data_dir {
            options.data_dir = dir.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            options.scratch_dir = Some(dir.clone());
        }
        if let Some(size) = &self.size {
            options.image_size = size.clone();
        }
        if let Some(overhead) = self.overhead {
            options.filesystem_overhead = overhead;
        }
        if self.preallocate {
            options.preallocation = true;
        }
        if let Some(format) = &self.source_format {
            options.source_format = Some(format.clone());
        }

        options.validate()?;
        Ok(options)
    }
}

pub fn image_ops(global: &GlobalFlags) -> Arc<dyn ImageOperations> {
    Arc::new(QemuImg::with_binary(&global.qemu_img))
}

/// Report the outcome of a run: the termination message on success, the
/// error text (or the scratch space marker) on failure.
pub fn report<P: DataProvider + 'static>(
    processor: &mut DataProcessor<P>,
    result: Result<(), ImportError>,
    target: &TargetArgs,
) -> anyhow::Result<()> {
    if let Err(e) = processor.close() {
        tracing::warn!(error = %e, "Failed to close data provider");
    }

    match result {
        Ok(()) => {
            let line = processor.termination_message().to_line()?;
            write_outcome(target, &line)?;
            println!("{}", line);
            Ok(())
        }
        Err(e) if e.requires_scratch_space() => {
            let message = TerminationMessage {
                scratch_space_required: Some(true),
                ..Default::default()
            };
            write_outcome(target, &message.to_line()?)?;
            Err(e.into())
        }
        Err(e) => {
            write_outcome(target, &e.to_string())?;
            Err(e.into())
        }
    }
}

fn write_outcome(target: &TargetArgs, line: &str) -> anyhow::Result<()> {
    if let Some(path) = &target.termination_log {
        write_termination_message(path, line)?;
    }
    Ok(())
}
