use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use volimport::{
    BlankDataProvider, CheckpointChain, ContentType, DataProcessor, DataProvider,
    DeltaChainProvider, ImageOperations, ImportOptions, ProcessingPhase, Quantity,
    ResumableDataProvider, ResumableStreamDataProvider, ResumePoint, StreamDataProvider,
};

use super::{TargetArgs, image_ops, report};
use crate::cli::GlobalFlags;

/// Source value that creates an empty image instead of reading one.
const BLANK_SOURCE: &str = "blank";

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Image file, checkpoint export directory, or "blank"
    #[arg(long)]
    pub source: String,

    /// What the source holds
    #[arg(long, value_enum, default_value_t = ContentTypeArg::Kubevirt)]
    pub content_type: ContentTypeArg,

    /// Pause after the transfer and record where to resume
    #[arg(long, requires = "resume_file")]
    pub resumable: bool,

    /// Resume point written on pause, or the last merged checkpoint for
    /// checkpoint imports
    #[arg(long)]
    pub resume_file: Option<PathBuf>,

    /// Checkpoint chain (JSON) describing a multistage import
    #[arg(long)]
    pub checkpoints: Option<PathBuf>,

    /// Checkpoint to import [default: first checkpoint not yet merged]
    #[arg(long, requires = "checkpoints")]
    pub checkpoint: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTypeArg {
    /// A virtual machine disk image
    Kubevirt,
    /// A tar archive unpacked into the data directory
    Archive,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Kubevirt => ContentType::Kubevirt,
            ContentTypeArg::Archive => ContentType::Archive,
        }
    }
}

pub fn execute(args: ImportArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let options = args.target.options()?;
    let ops = image_ops(global);

    if args.source == BLANK_SOURCE {
        let size = Quantity::parse_optional(&options.image_size)?
            .context("--size is required for blank images")?;
        tracing::info!(size = %size, dest = %options.dest_path().display(), "Creating blank image");
        let provider = BlankDataProvider::new(ops.clone(), size);
        let mut processor = DataProcessor::new(provider, &options, ops);
        let result = processor.process_data();
        return report(&mut processor, result, &args.target);
    }

    if let Some(chain_path) = &args.checkpoints {
        return import_checkpoint(&args, chain_path, &options, ops);
    }

    let source = PathBuf::from(&args.source);
    tracing::info!(source = %source.display(), content_type = ?args.content_type, "Importing image");

    if args.resumable {
        let provider = ResumableStreamDataProvider::open(&source, args.content_type.into())?;
        let mut processor = DataProcessor::new(provider, &options, ops);
        let result = processor.process_data_with_pause();
        if let Ok(phase) = &result
            && *phase == ProcessingPhase::PAUSE
        {
            let provider = processor.provider();
            let point = ResumePoint::new(provider.resume_phase(), provider.url().cloned());
            if let Some(path) = &args.resume_file {
                point.save(path)?;
            }
            processor.close()?;
            println!("paused before {}", point.phase);
            return Ok(());
        }
        return report(&mut processor, result.map(|_| ()), &args.target);
    }

    let provider = StreamDataProvider::open(&source, args.content_type.into())?;
    let mut processor = DataProcessor::new(provider, &options, ops);
    let result = processor.process_data();
    report(&mut processor, result, &args.target)
}

/// Import one checkpoint of a chain. Without `--checkpoint`, the resume file
/// names the last merged checkpoint and the next one is picked.
fn import_checkpoint(
    args: &ImportArgs,
    chain_path: &Path,
    options: &ImportOptions,
    ops: Arc<dyn ImageOperations>,
) -> anyhow::Result<()> {
    let chain = CheckpointChain::load(chain_path)?;

    let current = match &args.checkpoint {
        Some(id) => id.clone(),
        None => {
            let last_merged = match &args.resume_file {
                Some(path) if path.exists() => ResumePoint::load(path)?
                    .checkpoint
                    .map(|c| c.current),
                _ => None,
            };
            match chain.next_unmerged(last_merged.as_deref()) {
                Some(next) => next.current.clone(),
                None => {
                    tracing::info!(last_merged = ?last_merged, "All checkpoints already merged");
                    println!("nothing to import");
                    return Ok(());
                }
            }
        }
    };

    let provider = DeltaChainProvider::new(&args.source, chain, &current)?;
    let checkpoint = provider.checkpoint().clone();
    let mut processor = DataProcessor::new(provider, options, ops);
    let result = processor.process_data();
    let merged = result.is_ok();
    report(&mut processor, result, &args.target)?;

    if merged && let Some(path) = &args.resume_file {
        ResumePoint::new(ProcessingPhase::COMPLETE, None)
            .with_checkpoint(checkpoint)
            .save(path)?;
    }
    Ok(())
}
