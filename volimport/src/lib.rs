//! volimport - imports virtual machine disk images into storage volumes.
//!
//! A [`DataProcessor`] drives a [`DataProvider`] through a sequence of
//! phases (inspect, transfer, convert, resize, merge) until the destination
//! holds a raw image of the requested size.
//!
//! ```ignore
//! let ops = Arc::new(QemuImg::new());
//! let provider = StreamDataProvider::open(Path::new("cirros.qcow2"), ContentType::Kubevirt)?;
//! let mut processor = DataProcessor::new(provider, &options, ops);
//! processor.process_data()?;
//! ```

pub mod checkpoint;
pub mod image;
pub mod options;
pub mod processor;
pub mod provider;
pub mod quantity;
pub mod space;
pub mod termination;
pub mod util;

pub use checkpoint::{CheckpointChain, DataVolumeCheckpoint, ResumePoint};
pub use image::{ImageOperations, ImgInfo, QemuImg};
pub use options::ImportOptions;
pub use processor::{DataProcessor, ImportContext, PhaseExecutor, ProcessingPhase};
pub use provider::{
    BlankDataProvider, ContentType, DataProvider, DeltaChainProvider, ResumableDataProvider,
    ResumableStreamDataProvider, SourceFormat, StreamDataProvider,
};
pub use quantity::Quantity;
pub use termination::TerminationMessage;
pub use volimport_shared::errors::{ImportError, ImportResult};
