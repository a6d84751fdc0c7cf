//! Dump command implementation

use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use nordump_core::address::AddressStrategy;
use nordump_core::dump::{DumpError, DumpSession};
use nordump_core::gpio::GpioBackend;
use nordump_core::nor::NorBus;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;
use std::time::{Duration, Instant};

/// I/O error from the output file
#[derive(Debug)]
pub struct SinkError(pub std::io::Error);

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SinkError {}

impl embedded_io::Error for SinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Output file as a byte sink
pub struct FileSink {
    inner: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) `path`
    pub fn create(path: &Path) -> Result<Self, String> {
        let file = File::create(path)
            .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }
}

impl embedded_io::ErrorType for FileSink {
    type Error = SinkError;
}

impl embedded_io::Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.inner.write(buf).map_err(SinkError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush().map_err(SinkError)
    }
}

/// Dump the chip into `output`
pub fn run_dump<B: GpioBackend, A: AddressStrategy>(
    bus: &mut NorBus<B, A>,
    output: &Path,
    max_address: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let sink = FileSink::create(output)?;
    let session = DumpSession::new(sink, max_address);
    let total = session.total_bytes();

    let per_read_us = bus.timing().read_cycle_estimate_us(bus.addressing().bits());
    let estimate = Duration::from_micros(per_read_us.saturating_mul(total));
    log::info!(
        "Reading {} bytes, estimated time {}",
        total,
        HumanDuration(estimate)
    );

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    match session.run(bus, |written| pb.set_position(written)) {
        Ok(_) => {
            pb.finish_with_message("Dump complete");
            println!(
                "Wrote {} bytes to {:?} in {}",
                total,
                output,
                HumanDuration(start.elapsed())
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(describe(&e).into())
        }
    }
}

/// Error message for a failed dump
fn describe(e: &DumpError<SinkError>) -> String {
    match e {
        DumpError::Bus(e) => e.to_string(),
        DumpError::Write { address, error } => {
            format!("write error at addr 0x{:x}: {}", address, error)
        }
        DumpError::SinkFull { address } => {
            format!("write error at addr 0x{:x}: output full", address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_describe_sink_errors() {
        let e = DumpError::Write {
            address: 0x1234,
            error: SinkError(io::Error::new(io::ErrorKind::Other, "disk full")),
        };
        assert_eq!(describe(&e), "write error at addr 0x1234: disk full");
        assert_eq!(
            describe(&DumpError::SinkFull { address: 0x10 }),
            "write error at addr 0x10: output full"
        );
    }

    #[test]
    fn test_open_failure_names_path() {
        let path = Path::new("/nonexistent-dir/flash.bin");
        let err = FileSink::create(path).err().unwrap();
        assert!(err.starts_with("failed to open /nonexistent-dir/flash.bin"));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dump_to_file() {
        use nordump_core::address::SerialShifter;
        use nordump_core::gpio::{PinMap, Port};
        use nordump_core::timing::Timing;
        use nordump_dummy::{DummyBench, DummyConfig};

        let mut bench = DummyBench::new(DummyConfig {
            size: 0x100,
            ..Default::default()
        });
        let expected = bench.data().to_vec();

        let port = Port::new(&mut bench, PinMap::reference()).unwrap();
        let timing = Timing::default().with_settle_us(1);
        let mut bus = NorBus::new(port, SerialShifter::new(24), timing).unwrap();

        let path = std::env::temp_dir().join(format!("nordump-test-{}.bin", std::process::id()));
        run_dump(&mut bus, &path, 0xFF).unwrap();

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, expected);
    }
}
