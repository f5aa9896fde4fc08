use std::path::{Path, PathBuf};

use url::Url;
use volimport::{
    DataProvider, ImportError, ImportResult, ProcessingPhase, ResumableDataProvider,
    TerminationMessage,
};

/// Provider that answers with scripted phases and records what was called.
#[derive(Debug)]
pub struct MockDataProvider {
    pub info_response: ProcessingPhase,
    pub transfer_response: ProcessingPhase,
    pub transfer_file_response: ProcessingPhase,
    /// Record `Transfer` calls as `TransferScratch` instead of `TransferDataDir`.
    pub needs_scratch: bool,
    pub url: Option<Url>,
    pub termination: Option<TerminationMessage>,

    pub called_phases: Vec<ProcessingPhase>,
    pub transfer_path: Option<PathBuf>,
    pub transfer_file_name: Option<PathBuf>,
    pub close_calls: usize,

    info_error: Option<ImportError>,
    transfer_error: Option<ImportError>,
    transfer_file_error: Option<ImportError>,
}

impl MockDataProvider {
    pub fn new(info_response: ProcessingPhase, transfer_response: ProcessingPhase) -> Self {
        Self {
            info_response,
            transfer_response,
            transfer_file_response: ProcessingPhase::RESIZE,
            needs_scratch: false,
            url: None,
            termination: None,
            called_phases: Vec::new(),
            transfer_path: None,
            transfer_file_name: None,
            close_calls: 0,
            info_error: None,
            transfer_error: None,
            transfer_file_error: None,
        }
    }

    pub fn needing_scratch(mut self) -> Self {
        self.needs_scratch = true;
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_transfer_file_response(mut self, phase: ProcessingPhase) -> Self {
        self.transfer_file_response = phase;
        self
    }

    pub fn failing_info(mut self, err: ImportError) -> Self {
        self.info_error = Some(err);
        self
    }

    pub fn failing_transfer(mut self, err: ImportError) -> Self {
        self.transfer_error = Some(err);
        self
    }

    pub fn failing_transfer_file(mut self, err: ImportError) -> Self {
        self.transfer_file_error = Some(err);
        self
    }
}

impl DataProvider for MockDataProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        self.called_phases.push(ProcessingPhase::INFO);
        match self.info_error.take() {
            Some(err) => Err(err),
            None => Ok(self.info_response.clone()),
        }
    }

    fn transfer(&mut self, path: &Path, _preallocate: bool) -> ImportResult<ProcessingPhase> {
        self.transfer_path = Some(path.to_path_buf());
        self.called_phases.push(if self.needs_scratch {
            ProcessingPhase::TRANSFER_SCRATCH
        } else {
            ProcessingPhase::TRANSFER_DATA_DIR
        });
        match self.transfer_error.take() {
            Some(err) => Err(err),
            None => Ok(self.transfer_response.clone()),
        }
    }

    fn transfer_file(&mut self, file: &Path, _preallocate: bool) -> ImportResult<ProcessingPhase> {
        self.transfer_file_name = Some(file.to_path_buf());
        self.called_phases.push(ProcessingPhase::TRANSFER_DATA_FILE);
        match self.transfer_file_error.take() {
            Some(err) => Err(err),
            None => Ok(self.transfer_file_response.clone()),
        }
    }

    fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn termination_message(&self) -> Option<TerminationMessage> {
        self.termination.clone()
    }

    fn close(&mut self) -> ImportResult<()> {
        self.close_calls += 1;
        Ok(())
    }
}

/// Mock provider that can also resume.
#[derive(Debug)]
pub struct MockResumableDataProvider {
    pub inner: MockDataProvider,
    pub resume_phase: ProcessingPhase,
}

impl MockResumableDataProvider {
    pub fn new(inner: MockDataProvider, resume_phase: ProcessingPhase) -> Self {
        Self {
            inner,
            resume_phase,
        }
    }
}

impl DataProvider for MockResumableDataProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        self.inner.info()
    }

    fn transfer(&mut self, path: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        self.inner.transfer(path, preallocate)
    }

    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        self.inner.transfer_file(file, preallocate)
    }

    fn url(&self) -> Option<&Url> {
        self.inner.url()
    }

    fn close(&mut self) -> ImportResult<()> {
        self.inner.close()
    }
}

impl ResumableDataProvider for MockResumableDataProvider {
    fn resume_phase(&self) -> ProcessingPhase {
        self.resume_phase.clone()
    }
}
