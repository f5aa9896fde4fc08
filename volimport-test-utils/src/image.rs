use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use parking_lot::Mutex;
use url::Url;
use volimport::{ImageOperations, ImgInfo, ImportError, ImportResult, Quantity};

/// Image operations the fake can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Info,
    Convert,
    Validate,
    Resize,
    CreateBlank,
    Rebase,
    Commit,
}

#[derive(Debug, Default)]
struct State {
    info: ImgInfo,
    failing: HashSet<Op>,
    calls: Vec<Op>,
    resized_to: Vec<u64>,
    validated_with: Vec<u64>,
    converted_format: Vec<Option<String>>,
}

/// In-memory image tool.
///
/// Keeps one [`ImgInfo`] for whatever image is asked about. `resize`
/// updates its virtual size, `rebase` its backing file and `commit` bumps
/// its actual size by one. Conversion and blank creation touch the
/// destination file so later phases find it.
#[derive(Debug, Default)]
pub struct FakeImageOperations {
    state: Mutex<State>,
}

impl FakeImageOperations {
    pub fn new(info: ImgInfo) -> Self {
        Self {
            state: Mutex::new(State {
                info,
                ..Default::default()
            }),
        }
    }

    /// A fake on which every operation fails.
    pub fn all_errors() -> Self {
        let fake = Self::default();
        for op in [
            Op::Info,
            Op::Convert,
            Op::Validate,
            Op::Resize,
            Op::CreateBlank,
            Op::Rebase,
            Op::Commit,
        ] {
            fake.fail(op);
        }
        fake
    }

    pub fn fail(&self, op: Op) -> &Self {
        self.state.lock().failing.insert(op);
        self
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Sizes passed to `resize`, in call order.
    pub fn resized_to(&self) -> Vec<u64> {
        self.state.lock().resized_to.clone()
    }

    /// Available sizes passed to `validate`, in call order.
    pub fn validated_with(&self) -> Vec<u64> {
        self.state.lock().validated_with.clone()
    }

    /// Source formats pinned in `convert_to_raw_stream` calls.
    pub fn converted_format(&self) -> Vec<Option<String>> {
        self.state.lock().converted_format.clone()
    }

    pub fn image_info(&self) -> ImgInfo {
        self.state.lock().info.clone()
    }

    fn record(&self, op: Op) -> ImportResult<()> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if state.failing.contains(&op) {
            let message = format!("fake {op:?} failure");
            return Err(match op {
                Op::Validate => ImportError::Validation(message),
                _ => ImportError::Conversion(message),
            });
        }
        Ok(())
    }
}

/// Create or truncate a regular file. Device nodes are written in place, so
/// an existing one is left alone.
fn touch(path: &Path, len: u64) -> ImportResult<()> {
    if std::fs::metadata(path).is_ok_and(|m| !m.is_file()) {
        return Ok(());
    }
    let file = File::create(path)?;
    file.set_len(len)?;
    Ok(())
}

impl ImageOperations for FakeImageOperations {
    fn info(&self, _url: &Url) -> ImportResult<ImgInfo> {
        self.record(Op::Info)?;
        Ok(self.image_info())
    }

    fn convert_to_raw_stream(
        &self,
        _url: &Url,
        dest: &Path,
        _preallocate: bool,
        format: Option<&str>,
    ) -> ImportResult<()> {
        self.record(Op::Convert)?;
        self.state
            .lock()
            .converted_format
            .push(format.map(str::to_string));
        if dest.parent().is_some_and(Path::is_dir) {
            touch(dest, 0)?;
        }
        Ok(())
    }

    fn validate(&self, _url: &Url, available: u64) -> ImportResult<()> {
        self.state.lock().validated_with.push(available);
        self.record(Op::Validate)
    }

    fn resize(&self, _dest: &Path, size: Quantity, _preallocate: bool) -> ImportResult<()> {
        self.record(Op::Resize)?;
        let mut state = self.state.lock();
        state.resized_to.push(size.bytes());
        state.info.virtual_size = size.bytes();
        Ok(())
    }

    fn create_blank_image(&self, dest: &Path, size: Quantity, _preallocate: bool) -> ImportResult<()> {
        self.record(Op::CreateBlank)?;
        touch(dest, size.bytes())?;
        let mut state = self.state.lock();
        state.info.format = "raw".into();
        state.info.virtual_size = size.bytes();
        Ok(())
    }

    fn rebase(&self, backing_file: &Path, _delta: &Url) -> ImportResult<()> {
        self.record(Op::Rebase)?;
        self.state.lock().info.backing_file = backing_file.display().to_string();
        Ok(())
    }

    fn commit(&self, _image: &Url) -> ImportResult<()> {
        self.record(Op::Commit)?;
        self.state.lock().info.actual_size += 1;
        Ok(())
    }
}
