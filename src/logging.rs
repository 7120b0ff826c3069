use env_logger::{Builder, Env, Target};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

// The REPL owns the terminal, so file logging goes through a shared handle.
struct MutexWriter {
    inner: Mutex<File>,
}

impl MutexWriter {
    fn new(file: File) -> Self {
        Self {
            inner: Mutex::new(file),
        }
    }
}

impl Write for MutexWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        file.flush()
    }
}

/// Logs to stderr, or to `log_file` when given. `RUST_LOG` overrides the
/// default `info` level either way.
pub fn setup_logging(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        let writer = MutexWriter::new(File::create(path)?);
        builder
            .target(Target::Pipe(Box::new(writer)))
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()));
    }

    builder.try_init()?;
    Ok(())
}
