//! Providers reading from a byte stream (local file or upload body).

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use url::Url;
use volimport_shared::constants::filenames::SCRATCH_IMAGE;
use xz2::read::XzDecoder;
use volimport_shared::errors::{ImportError, ImportResult};

use super::format::{ContentType, HEADER_LEN, SourceFormat};
use super::{DataProvider, ResumableDataProvider, check_transfer_dir};
use crate::checkpoint::ResumePoint;
use crate::image::path_url;
use crate::processor::ProcessingPhase;
use crate::termination::TerminationMessage;
use crate::util::{clean_all, stream_to_file};

type SourceReader = Box<dyn Read + Send>;

/// Read the format header and hand back a reader that still yields it.
fn sniff(mut reader: SourceReader) -> ImportResult<(SourceFormat, SourceReader)> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    reader
        .by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| ImportError::Provider(format!("unable to read source: {e}")))?;
    if header.is_empty() {
        return Err(ImportError::Provider("source stream is empty".into()));
    }
    let format = SourceFormat::detect(&header);
    Ok((format, Box::new(Cursor::new(header).chain(reader))))
}

/// Imports whatever a byte stream carries.
///
/// `info` sniffs the stream: gzip and xz are unwrapped transparently, formats that
/// need conversion go through scratch space, raw images stream straight
/// into the destination, and archive content is unpacked as a tar.
pub struct StreamDataProvider {
    reader: Option<SourceReader>,
    content_type: ContentType,
    format: Option<SourceFormat>,
    compression: Option<SourceFormat>,
    url: Option<Url>,
}

impl StreamDataProvider {
    pub fn new<R: Read + Send + 'static>(reader: R, content_type: ContentType) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            content_type,
            format: None,
            compression: None,
            url: None,
        }
    }

    /// Stream a local file.
    pub fn open(path: &Path, content_type: ContentType) -> ImportResult<Self> {
        let file = File::open(path).map_err(|e| {
            ImportError::Provider(format!("unable to open source {}: {e}", path.display()))
        })?;
        Ok(Self::new(file, content_type))
    }

    /// Provider with no stream attached, e.g. when resuming after the transfer.
    fn detached(content_type: ContentType, url: Option<Url>) -> Self {
        Self {
            reader: None,
            content_type,
            format: None,
            compression: None,
            url,
        }
    }

    /// Format detected by `info`, after decompression.
    pub fn format(&self) -> Option<SourceFormat> {
        self.format
    }

    fn reader(&mut self) -> ImportResult<&mut SourceReader> {
        self.reader
            .as_mut()
            .ok_or_else(|| ImportError::Provider("source stream is closed".into()))
    }
}

impl DataProvider for StreamDataProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| ImportError::Provider("source stream is closed".into()))?;

        let (mut format, mut reader) = sniff(reader)?;
        if format.is_compressed() {
            self.compression = Some(format);
            let decoder: SourceReader = match format {
                SourceFormat::Xz => Box::new(XzDecoder::new(reader)),
                _ => Box::new(GzDecoder::new(reader)),
            };
            (format, reader) = sniff(decoder)?;
        }
        // One layer of compression only.
        if format.is_compressed() {
            return Err(ImportError::Provider(format!(
                "nested {} compression is not supported",
                format.as_str()
            )));
        }
        self.reader = Some(reader);
        self.format = Some(format);

        tracing::info!(
            format = format.as_str(),
            compressed = self.compression.is_some(),
            content_type = self.content_type.as_str(),
            "Detected source format"
        );

        match self.content_type {
            ContentType::Archive if format == SourceFormat::Tar => Ok(ProcessingPhase::TRANSFER_DATA_DIR),
            ContentType::Archive => Err(ImportError::Provider(format!(
                "archive content must be a tar stream, found {}",
                format.as_str()
            ))),
            ContentType::Kubevirt if format.needs_conversion() => Ok(ProcessingPhase::TRANSFER_SCRATCH),
            ContentType::Kubevirt => Ok(ProcessingPhase::TRANSFER_DATA_FILE),
        }
    }

    fn transfer(&mut self, path: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        check_transfer_dir(path)?;
        let content_type = self.content_type;
        let reader = self.reader()?;

        if content_type == ContentType::Archive {
            tar::Archive::new(reader.as_mut())
                .unpack(path)
                .map_err(|e| ImportError::Transfer(format!("unable to unpack archive: {e}")))?;
            tracing::info!(dir = %path.display(), "Unpacked archive");
            return Ok(ProcessingPhase::COMPLETE);
        }

        let file = path.join(SCRATCH_IMAGE);
        clean_all(&file)?;
        stream_to_file(reader.as_mut(), &file, preallocate)?;
        self.url = Some(path_url(&file)?);
        Ok(ProcessingPhase::CONVERT)
    }

    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        let reader = self.reader()?;
        clean_all(file)?;
        stream_to_file(reader.as_mut(), file, preallocate)?;
        self.url = Some(path_url(file)?);
        Ok(ProcessingPhase::RESIZE)
    }

    fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn termination_message(&self) -> Option<TerminationMessage> {
        let format = self.format?;
        let mut message = TerminationMessage::default();
        message
            .labels
            .insert("sourceFormat".into(), format.as_str().into());
        if let Some(compression) = self.compression {
            message
                .labels
                .insert("compression".into(), compression.as_str().into());
        }
        Some(message)
    }

    fn close(&mut self) -> ImportResult<()> {
        self.reader = None;
        Ok(())
    }
}

/// Stream provider that pauses after the transfer so validation and
/// conversion can run in a later process.
pub struct ResumableStreamDataProvider {
    inner: StreamDataProvider,
    resume_phase: ProcessingPhase,
}

impl ResumableStreamDataProvider {
    pub fn new<R: Read + Send + 'static>(reader: R, content_type: ContentType) -> Self {
        Self {
            inner: StreamDataProvider::new(reader, content_type),
            resume_phase: ProcessingPhase::INFO,
        }
    }

    pub fn open(path: &Path, content_type: ContentType) -> ImportResult<Self> {
        Ok(Self {
            inner: StreamDataProvider::open(path, content_type)?,
            resume_phase: ProcessingPhase::INFO,
        })
    }

    /// Rebuild the provider of a paused run from its saved resume point.
    pub fn from_resume_point(point: &ResumePoint) -> Self {
        Self {
            inner: StreamDataProvider::detached(ContentType::Kubevirt, point.image.clone()),
            resume_phase: point.phase.clone(),
        }
    }

    pub fn format(&self) -> Option<SourceFormat> {
        self.inner.format()
    }

    fn pause_before(&mut self, next: ProcessingPhase) -> ProcessingPhase {
        if next == ProcessingPhase::CONVERT || next == ProcessingPhase::RESIZE {
            tracing::debug!(resume_phase = %next, "Pausing after transfer");
            self.resume_phase = next;
            ProcessingPhase::VALIDATE_PAUSE
        } else {
            next
        }
    }
}

impl DataProvider for ResumableStreamDataProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        self.inner.info()
    }

    fn transfer(&mut self, path: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        let next = self.inner.transfer(path, preallocate)?;
        Ok(self.pause_before(next))
    }

    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        let next = self.inner.transfer_file(file, preallocate)?;
        Ok(self.pause_before(next))
    }

    fn url(&self) -> Option<&Url> {
        self.inner.url()
    }

    fn termination_message(&self) -> Option<TerminationMessage> {
        self.inner.termination_message()
    }

    fn close(&mut self) -> ImportResult<()> {
        self.inner.close()
    }
}

impl ResumableDataProvider for ResumableStreamDataProvider {
    fn resume_phase(&self) -> ProcessingPhase {
        self.resume_phase.clone()
    }
}
