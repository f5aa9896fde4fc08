use std::path::PathBuf;

use clap::Args;
use volimport::{
    DataProcessor, DataProvider, ProcessingPhase, ResumableDataProvider,
    ResumableStreamDataProvider, ResumePoint,
};

use super::{TargetArgs, image_ops, report};
use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Resume point written by a paused `import --resumable`
    #[arg(long)]
    pub resume_file: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub fn execute(args: ResumeArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let options = args.target.options()?;
    let point = ResumePoint::load(&args.resume_file)?;
    tracing::info!(
        phase = %point.phase,
        paused_at = %point.paused_at,
        image = ?point.image.as_ref().map(|u| u.as_str()),
        "Resuming import"
    );

    let provider = ResumableStreamDataProvider::from_resume_point(&point);
    let mut processor = DataProcessor::new(provider, &options, image_ops(global));
    let result = processor.process_data_resume();

    match &result {
        Ok(phase) if *phase == ProcessingPhase::PAUSE => {
            let provider = processor.provider();
            let point = ResumePoint::new(provider.resume_phase(), provider.url().cloned());
            point.save(&args.resume_file)?;
            processor.close()?;
            println!("paused before {}", point.phase);
            return Ok(());
        }
        Ok(_) => {
            if let Err(e) = std::fs::remove_file(&args.resume_file) {
                tracing::warn!(path = %args.resume_file.display(), error = %e, "Failed to remove resume file");
            }
        }
        Err(_) => {}
    }
    report(&mut processor, result.map(|_| ()), &args.target)
}
