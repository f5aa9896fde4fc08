use std::fs::{File, FileType};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use volimport_shared::errors::{ImportError, ImportResult};

const LOG_FILE_NAME: &str = "volimport.log";
const COPY_CHUNK_SIZE: usize = 64 * 1024;

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter, ansi: bool) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(ansi),
        )
        .try_init();
}

/// Initialize tracing.
///
/// With `log_dir` set, logs go to `{log_dir}/volimport.log` with daily
/// rotation; otherwise to stderr. The returned guard must be kept alive for
/// the background writer to flush.
pub fn init_logging(log_dir: Option<&Path>, default_level: &str) -> ImportResult<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ImportError::Config(format!("invalid log filter {default_level:?}: {e}")))?;

    let guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            register_to_tracing(non_blocking, env_filter, false);
            guard
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(io::stderr());
            register_to_tracing(non_blocking, env_filter, true);
            guard
        }
    };
    Ok(guard)
}

/// Remove `path` whether it is a file or a directory tree. Missing is fine.
///
/// Device nodes are left in place: a block device destination is written
/// into, never replaced.
pub fn clean_all(path: &Path) -> ImportResult<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if is_device(&meta.file_type()) => {
            tracing::debug!(path = %path.display(), "Keeping device node");
            return Ok(());
        }
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| ImportError::InvalidPath(format!("failed to remove {}: {e}", path.display())))
}

fn is_device(file_type: &FileType) -> bool {
    file_type.is_block_device() || file_type.is_char_device()
}

/// Copy `reader` into a fresh file at `dest`, returning the bytes written.
///
/// Without `preallocate`, all-zero chunks of a regular file are skipped with
/// a seek so the file stays sparse. Devices get every byte written.
pub fn stream_to_file<R: Read + ?Sized>(
    reader: &mut R,
    dest: &Path,
    preallocate: bool,
) -> ImportResult<u64> {
    let mut file = File::create(dest)
        .map_err(|e| ImportError::InvalidPath(format!("failed to create {}: {e}", dest.display())))?;

    let regular = file.metadata()?.file_type().is_file();
    let sparse = regular && !preallocate;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ImportError::Transfer(format!("reading source: {e}"))),
        };
        let chunk = &buf[..n];
        if sparse && chunk.iter().all(|b| *b == 0) {
            file.seek(SeekFrom::Current(n as i64))?;
        } else {
            file.write_all(chunk)
                .map_err(|e| ImportError::Transfer(format!("writing {}: {e}", dest.display())))?;
        }
        written += n as u64;
    }

    if regular {
        // Trailing holes are only materialized by extending the length.
        file.set_len(written)?;
        file.sync_all()?;
    } else if let Err(e) = file.sync_all() {
        tracing::debug!(dest = %dest.display(), error = %e, "Device does not support fsync");
    }

    tracing::debug!(
        dest = %dest.display(),
        bytes = written,
        preallocate,
        "Streamed source data to file"
    );
    Ok(written)
}
