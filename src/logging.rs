use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

/// Target every diagnostic line is emitted under; the fmt subscriber prints it as a prefix.
pub const LOG_TARGET: &str = "sql_utils";

/// Writes log lines to stdout and, optionally, a file.
#[derive(Clone)]
pub struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    /// # Errors
    /// Returns the I/O error if the log file cannot be created.
    pub fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Arc::new(Mutex::new(File::create(path)?))),
            None => None,
        };
        Ok(Self { file })
    }
}

pub struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stdout = io::stdout();
        stdout.write_all(buf)?;
        if let Some(file) = &self.file {
            let mut handle = file
                .lock()
                .map_err(|_| io::Error::other("log file lock poisoned"))?;
            handle.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            let mut handle = file
                .lock()
                .map_err(|_| io::Error::other("log file lock poisoned"))?;
            handle.flush()?;
        }
        Ok(())
    }
}

/// Install a global fmt subscriber writing tagged lines to stdout (and `log_file` if set).
///
/// # Errors
/// Returns an error if the log file cannot be created or a global subscriber is already set.
pub fn init(
    level: Level,
    log_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let writer = LogWriter::new(log_file)?;
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_max_level(level)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_receives_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sql_utils.log");
        let writer = LogWriter::new(Some(path.clone())).unwrap();

        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: LOG_TARGET, "hello from the log writer");
        });

        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("sql_utils"));
        assert!(contents.contains("hello from the log writer"));
    }

    #[test]
    fn init_reports_a_second_global_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        // Whichever call installs the global subscriber, the one after it must fail.
        let _ = init(Level::INFO, Some(dir.path().join("first.log")));
        assert!(init(Level::INFO, None).is_err());
    }

    #[test]
    fn init_reports_an_uncreatable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = init(Level::INFO, Some(dir.path().join("missing").join("x.log")));
        assert!(err.is_err());
    }
}
