//! Provider for one stage of a checkpoint chain exported to local disk.
//!
//! The source directory holds one image per checkpoint, named after the
//! checkpoint id (`<current>.qcow2`, `<current>.img` or `<current>.raw`).
//! The base image is converted like any other source; every later stage is
//! a delta that gets merged into the destination.

use std::path::{Path, PathBuf};

use url::Url;
use volimport_shared::constants::filenames::SCRATCH_IMAGE;
use volimport_shared::errors::{ImportError, ImportResult};

use super::{DataProvider, check_transfer_dir};
use crate::checkpoint::{CheckpointChain, DataVolumeCheckpoint};
use crate::image::path_url;
use crate::processor::ProcessingPhase;
use crate::termination::TerminationMessage;
use crate::util::clean_all;

const IMAGE_EXTENSIONS: &[&str] = &["qcow2", "img", "raw"];

pub struct DeltaChainProvider {
    source_dir: PathBuf,
    chain: CheckpointChain,
    checkpoint: DataVolumeCheckpoint,
    image: Option<PathBuf>,
    url: Option<Url>,
}

impl DeltaChainProvider {
    /// Import the stage of `chain` that produces checkpoint `current`.
    pub fn new(source_dir: impl Into<PathBuf>, chain: CheckpointChain, current: &str) -> ImportResult<Self> {
        chain.validate()?;
        let checkpoint = chain
            .get(current)
            .cloned()
            .ok_or_else(|| ImportError::Config(format!("checkpoint {current} is not in the chain")))?;
        Ok(Self {
            source_dir: source_dir.into(),
            chain,
            checkpoint,
            image: None,
            url: None,
        })
    }

    pub fn checkpoint(&self) -> &DataVolumeCheckpoint {
        &self.checkpoint
    }

    /// Whether this stage finishes the whole chain.
    pub fn is_final(&self) -> bool {
        self.chain.is_final(&self.checkpoint.current)
    }

    fn locate_image(&self) -> Option<PathBuf> {
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.source_dir.join(format!("{}.{ext}", self.checkpoint.current)))
            .find(|p| p.is_file())
    }
}

impl DataProvider for DeltaChainProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        let image = self.locate_image().ok_or_else(|| {
            ImportError::Provider(format!(
                "no exported image for checkpoint {} in {}",
                self.checkpoint.current,
                self.source_dir.display()
            ))
        })?;
        tracing::info!(
            checkpoint = %self.checkpoint.current,
            previous = %self.checkpoint.previous,
            image = %image.display(),
            "Found checkpoint image"
        );
        self.image = Some(image);
        Ok(ProcessingPhase::TRANSFER_SCRATCH)
    }

    fn transfer(&mut self, path: &Path, _preallocate: bool) -> ImportResult<ProcessingPhase> {
        check_transfer_dir(path)?;
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| ImportError::Provider("info must run before transfer".into()))?;

        let dest = path.join(SCRATCH_IMAGE);
        clean_all(&dest)?;
        std::fs::copy(image, &dest).map_err(|e| {
            ImportError::Transfer(format!("unable to copy {}: {e}", image.display()))
        })?;
        self.url = Some(path_url(&dest)?);

        if self.checkpoint.is_base() {
            Ok(ProcessingPhase::CONVERT)
        } else {
            Ok(ProcessingPhase::MERGE_DELTA)
        }
    }

    fn transfer_file(&mut self, _file: &Path, _preallocate: bool) -> ImportResult<ProcessingPhase> {
        Err(ImportError::Provider(
            "checkpoint images are always staged in scratch space".into(),
        ))
    }

    fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn termination_message(&self) -> Option<TerminationMessage> {
        let position = self.chain.position(&self.checkpoint.current)?;
        let mut message = TerminationMessage {
            delta_count: Some(position as u32 + 1),
            ..Default::default()
        };
        message
            .labels
            .insert("checkpoint".into(), self.checkpoint.current.clone());
        if self.is_final() {
            message.labels.insert("finalCheckpoint".into(), "true".into());
        }
        Some(message)
    }

    fn close(&mut self) -> ImportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chain() -> CheckpointChain {
        CheckpointChain::from_json(
            r#"{"checkpoints":[{"previous":"","current":"base"},{"previous":"base","current":"d1"}],"finalCheckpoint":true}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_base_checkpoint_converts() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        std::fs::write(source.path().join("base.qcow2"), b"base").unwrap();

        let mut provider = DeltaChainProvider::new(source.path(), chain(), "base").unwrap();
        assert_eq!(provider.info().unwrap(), ProcessingPhase::TRANSFER_SCRATCH);
        assert_eq!(provider.transfer(scratch.path(), false).unwrap(), ProcessingPhase::CONVERT);
        assert_eq!(
            std::fs::read(scratch.path().join(SCRATCH_IMAGE)).unwrap(),
            b"base"
        );

        let message = provider.termination_message().unwrap();
        assert_eq!(message.delta_count, Some(1));
        assert!(!provider.is_final());
    }

    #[test]
    fn test_later_checkpoint_merges() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        std::fs::write(source.path().join("d1.img"), b"delta").unwrap();

        let mut provider = DeltaChainProvider::new(source.path(), chain(), "d1").unwrap();
        provider.info().unwrap();
        assert_eq!(
            provider.transfer(scratch.path(), false).unwrap(),
            ProcessingPhase::MERGE_DELTA
        );
        assert!(provider.url().is_some());

        let message = provider.termination_message().unwrap();
        assert_eq!(message.delta_count, Some(2));
        assert_eq!(message.labels.get("finalCheckpoint").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_missing_image_fails_info() {
        let source = TempDir::new().unwrap();
        let mut provider = DeltaChainProvider::new(source.path(), chain(), "base").unwrap();
        assert!(matches!(provider.info(), Err(ImportError::Provider(_))));
    }

    #[test]
    fn test_unknown_checkpoint_rejected() {
        let source = TempDir::new().unwrap();
        let result = DeltaChainProvider::new(source.path(), chain(), "nope");
        assert!(matches!(result, Err(ImportError::Config(_))));
    }

    #[test]
    fn test_transfer_file_unsupported() {
        let source = TempDir::new().unwrap();
        let mut provider = DeltaChainProvider::new(source.path(), chain(), "base").unwrap();
        assert!(provider.transfer_file(&source.path().join("x"), false).is_err());
    }
}
