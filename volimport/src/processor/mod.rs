//! The import state machine.
//!
//! `DataProcessor` runs phases one at a time: it looks up the executor bound
//! to the current phase, runs it, and moves to the phase it returns until the
//! run completes, pauses or fails.
//!
//! ```text
//! Info ─┬─> TransferScratch ──> Convert ──> Resize ──> Complete
//!       │        │   └────────> MergeDelta ──────────> Complete
//!       │        └────────────> ValidatePause ───────> Pause
//!       ├─> TransferDataFile ─────────────> Resize
//!       └─> TransferDataDir ──────────────────────────> Complete
//! ```
//!
//! Additional phases are registered before a run with
//! [`DataProcessor::register_phase_executor`].

mod context;
mod executors;
mod phase;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use volimport_shared::errors::{ImportError, ImportResult};

use crate::image::ImageOperations;
use crate::options::ImportOptions;
use crate::provider::{DataProvider, ResumableDataProvider};
use crate::space::{HostSpaceProbe, SpaceProbe};
use crate::termination::TerminationMessage;

pub use context::ImportContext;
pub use executors::resize_image;
pub use phase::ProcessingPhase;

/// Work bound to one phase.
///
/// Returns the next phase on success. Plain functions and closures taking
/// `&mut ImportContext<P>` implement this trait.
pub trait PhaseExecutor<P> {
    fn execute(&mut self, ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase>;
}

impl<P, F> PhaseExecutor<P> for F
where
    F: FnMut(&mut ImportContext<P>) -> ImportResult<ProcessingPhase>,
{
    fn execute(&mut self, ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
        self(ctx)
    }
}

/// Drives one import from a data provider into the destination.
pub struct DataProcessor<P> {
    ctx: ImportContext<P>,
    executors: HashMap<ProcessingPhase, Box<dyn PhaseExecutor<P>>>,
    current_phase: ProcessingPhase,
}

impl<P: DataProvider + 'static> DataProcessor<P> {
    /// Create a processor measuring space on the host.
    pub fn new(provider: P, options: &ImportOptions, ops: Arc<dyn ImageOperations>) -> Self {
        Self::with_probe(provider, options, ops, Box::new(HostSpaceProbe))
    }

    /// Create a processor with an explicit space probe.
    pub fn with_probe(
        provider: P,
        options: &ImportOptions,
        ops: Arc<dyn ImageOperations>,
        probe: Box<dyn SpaceProbe>,
    ) -> Self {
        let mut ctx = ImportContext {
            provider,
            ops,
            probe,
            data_file: options.dest_path(),
            data_dir: options.data_dir.clone(),
            scratch_dir: options.scratch_dir.clone().unwrap_or_default(),
            requested_size: options.image_size.clone(),
            filesystem_overhead: options.filesystem_overhead,
            preallocation: options.preallocation,
            preallocation_applied: false,
            source_format: options.source_format.clone(),
            available_space: None,
        };
        ctx.available_space = ctx.calculate_target_size();

        tracing::info!(
            dest = %ctx.data_file.display(),
            data_dir = %ctx.data_dir.display(),
            scratch_dir = %ctx.scratch_dir.display(),
            requested_size = %ctx.requested_size,
            available_space = ?ctx.available_space,
            "Created data processor"
        );

        let mut processor = Self {
            ctx,
            executors: HashMap::new(),
            current_phase: ProcessingPhase::INFO,
        };
        processor.register_default_executors();
        processor
    }

    fn register_default_executors(&mut self) {
        self.register_phase_executor(ProcessingPhase::INFO, executors::info::<P>);
        self.register_phase_executor(ProcessingPhase::TRANSFER_SCRATCH, executors::transfer_scratch::<P>);
        self.register_phase_executor(ProcessingPhase::TRANSFER_DATA_DIR, executors::transfer_data_dir::<P>);
        self.register_phase_executor(ProcessingPhase::TRANSFER_DATA_FILE, executors::transfer_data_file::<P>);
        self.register_phase_executor(ProcessingPhase::VALIDATE_PAUSE, executors::validate_pause::<P>);
        self.register_phase_executor(ProcessingPhase::CONVERT, executors::convert::<P>);
        self.register_phase_executor(ProcessingPhase::RESIZE, executors::resize::<P>);
        self.register_phase_executor(ProcessingPhase::MERGE_DELTA, executors::merge_delta::<P>);
    }

    /// Bind `executor` to `phase`, replacing any previous binding.
    pub fn register_phase_executor<E>(&mut self, phase: ProcessingPhase, executor: E)
    where
        E: PhaseExecutor<P> + 'static,
    {
        self.executors.insert(phase, Box::new(executor));
    }

    /// Run until the import completes or pauses.
    pub fn process_data(&mut self) -> ImportResult<()> {
        self.process_data_with_pause().map(|_| ())
    }

    /// Run until the import completes or pauses, returning where it stopped.
    pub fn process_data_with_pause(&mut self) -> ImportResult<ProcessingPhase> {
        let mut visited = HashSet::new();

        while !self.current_phase.is_terminal() {
            let phase = self.current_phase.clone();
            if !visited.insert(phase.clone()) {
                return self.fail(&phase, ImportError::CycleDetected(phase.to_string()));
            }
            let Some(executor) = self.executors.get_mut(&phase) else {
                return self.fail(&phase, ImportError::UnknownPhase(phase.to_string()));
            };

            tracing::debug!(phase = %phase, "Executing phase");
            let next = match executor.execute(&mut self.ctx) {
                Ok(next) if next == ProcessingPhase::ERROR => {
                    let err = ImportError::Provider(format!(
                        "phase {phase} moved to {next} without reporting an error"
                    ));
                    return self.fail(&phase, err);
                }
                Ok(next) => next,
                Err(e) => return self.fail(&phase, e),
            };
            tracing::debug!(phase = %phase, next = %next, "Phase finished");
            self.current_phase = next;
        }

        self.ensure_not_failed()?;
        tracing::info!(phase = %self.current_phase, "Processing stopped");
        Ok(self.current_phase.clone())
    }

    fn ensure_not_failed(&self) -> ImportResult<()> {
        if self.current_phase == ProcessingPhase::ERROR {
            return Err(ImportError::Config(
                "processor already failed, create a new one to retry".into(),
            ));
        }
        Ok(())
    }

    fn fail(&mut self, phase: &ProcessingPhase, err: ImportError) -> ImportResult<ProcessingPhase> {
        tracing::error!(phase = %phase, error = %err, "Processing failed");
        self.current_phase = ProcessingPhase::ERROR;
        Err(err)
    }

    pub fn current_phase(&self) -> &ProcessingPhase {
        &self.current_phase
    }

    pub fn context(&self) -> &ImportContext<P> {
        &self.ctx
    }

    pub fn provider(&self) -> &P {
        &self.ctx.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.ctx.provider
    }

    /// Whether the destination ended up preallocated.
    pub fn preallocation_applied(&self) -> bool {
        self.ctx.preallocation_applied
    }

    /// Space measured when the processor was built, `None` if unknown.
    pub fn available_space(&self) -> Option<u64> {
        self.ctx.available_space
    }

    pub fn usable_space(&self) -> Option<u64> {
        self.ctx.usable_space()
    }

    pub fn calculate_target_size(&self) -> Option<u64> {
        self.ctx.calculate_target_size()
    }

    /// The provider's termination message plus the processor's own results.
    pub fn termination_message(&self) -> TerminationMessage {
        let mut message = self.ctx.provider.termination_message().unwrap_or_default();
        if self.ctx.preallocation {
            message.preallocation_applied = Some(self.ctx.preallocation_applied);
        }
        message
    }

    /// Release the provider's resources.
    pub fn close(&mut self) -> ImportResult<()> {
        self.ctx.provider.close()
    }

    pub fn into_provider(self) -> P {
        self.ctx.provider
    }
}

impl<P: ResumableDataProvider + 'static> DataProcessor<P> {
    /// Run a paused import again, starting at the provider's resume phase.
    pub fn process_data_resume(&mut self) -> ImportResult<ProcessingPhase> {
        self.ensure_not_failed()?;
        self.current_phase = self.ctx.provider.resume_phase();
        tracing::info!(phase = %self.current_phase, "Resuming import");
        self.process_data_with_pause()
    }
}
