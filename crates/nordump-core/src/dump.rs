//! Full-chip dump
//!
//! A [`DumpSession`] reads every address from 0 up to the chip's last
//! address, in order, and writes one byte per address to a sink. The first
//! sink failure ends the session; there is no resume, a new dump starts at
//! address 0 again.

use core::fmt;

use embedded_io::Write;

use crate::address::AddressStrategy;
use crate::error::Error;
use crate::gpio::GpioBackend;
use crate::nor::NorBus;

/// Bytes between progress callbacks
pub const PROGRESS_INTERVAL: u64 = 4096;

/// Dump failure
#[derive(Debug)]
pub enum DumpError<E> {
    /// Bus or addressing error before or during the walk
    Bus(Error),
    /// The sink rejected the byte read at `address`
    Write {
        /// Address whose byte could not be stored
        address: u32,
        /// Sink error
        error: E,
    },
    /// The sink accepted nothing for the byte read at `address`
    SinkFull {
        /// Address whose byte could not be stored
        address: u32,
    },
}

impl<E> DumpError<E> {
    /// Address at which the sink failed, if that is what happened
    pub fn address(&self) -> Option<u32> {
        match self {
            Self::Bus(_) => None,
            Self::Write { address, .. } | Self::SinkFull { address } => Some(*address),
        }
    }
}

impl<E> From<Error> for DumpError<E> {
    fn from(e: Error) -> Self {
        Self::Bus(e)
    }
}

impl<E: fmt::Debug> fmt::Display for DumpError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{}", e),
            Self::Write { address, error } => {
                write!(f, "write error at addr 0x{:x}: {:?}", address, error)
            }
            Self::SinkFull { address } => {
                write!(f, "write error at addr 0x{:x}: output full", address)
            }
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for DumpError<E> {}

/// One dump run: a sink and the next address to read
pub struct DumpSession<W> {
    sink: W,
    cursor: u32,
    max_address: u32,
    written: u64,
}

impl<W: Write> DumpSession<W> {
    /// New session covering `0..=max_address`
    pub fn new(sink: W, max_address: u32) -> Self {
        Self {
            sink,
            cursor: 0,
            max_address,
            written: 0,
        }
    }

    /// Next address to be read
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Last address of the session
    pub fn max_address(&self) -> u32 {
        self.max_address
    }

    /// Number of bytes the session will produce
    pub fn total_bytes(&self) -> u64 {
        self.max_address as u64 + 1
    }

    /// Bytes acknowledged by the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Walk the whole range
    ///
    /// `progress` is called with the number of bytes written every
    /// [`PROGRESS_INTERVAL`] bytes and once at the end. On success the sink
    /// is flushed and handed back; on failure the session (and the sink)
    /// is dropped.
    pub fn run<B, A, F>(
        mut self,
        bus: &mut NorBus<B, A>,
        mut progress: F,
    ) -> Result<W, DumpError<W::Error>>
    where
        B: GpioBackend,
        A: AddressStrategy,
        F: FnMut(u64),
    {
        let max = bus.max_address();
        if self.max_address > max {
            return Err(DumpError::Bus(Error::AddressOutOfRange {
                address: self.max_address,
                max,
            }));
        }

        log::info!("Dumping NOR flash from address 0 to 0x{:08x}", self.max_address);
        bus.prepare_read();

        loop {
            let address = self.cursor;
            let byte = bus.read(address)?;

            match self.sink.write(&[byte]) {
                Ok(0) => return Err(DumpError::SinkFull { address }),
                Ok(_) => {}
                Err(error) => return Err(DumpError::Write { address, error }),
            }
            self.written += 1;

            if self.written % PROGRESS_INTERVAL == 0 {
                progress(self.written);
            }
            if address == self.max_address {
                break;
            }
            self.cursor = address + 1;
        }

        self.sink.flush().map_err(|error| DumpError::Write {
            address: self.max_address,
            error,
        })?;
        progress(self.written);
        log::debug!("dump: {} bytes written", self.written);

        Ok(self.sink)
    }
}

/// Dump `0..=max_address` into `sink`
pub fn dump<B, A, W, F>(
    bus: &mut NorBus<B, A>,
    sink: W,
    max_address: u32,
    progress: F,
) -> Result<W, DumpError<W::Error>>
where
    B: GpioBackend,
    A: AddressStrategy,
    W: Write,
    F: FnMut(u64),
{
    DumpSession::new(sink, max_address).run(bus, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SerialShifter;
    use crate::gpio::{Direction, Level, PinMap, PinRole, Port};
    use crate::testing::Recorder;
    use crate::timing::Timing;
    use embedded_io::{ErrorKind, ErrorType};
    use std::vec::Vec;

    #[derive(Debug, PartialEq)]
    struct Rejected;

    impl embedded_io::Error for Rejected {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Sink that stores bytes and fails once `limit` bytes are stored
    #[derive(Debug)]
    struct LimitedSink<'a> {
        out: &'a mut Vec<u8>,
        limit: usize,
        full: bool,
    }

    impl ErrorType for LimitedSink<'_> {
        type Error = Rejected;
    }

    impl Write for LimitedSink<'_> {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.out.len() >= self.limit {
                return if self.full { Ok(0) } else { Err(Rejected) };
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn bus(bits: u8) -> NorBus<Recorder, SerialShifter> {
        let mut map = PinMap::reference();
        map.addressing = crate::gpio::AddressLines::Serial {
            data: 9,
            clock: 25,
            bits,
        };
        let port = Port::new(Recorder::default(), map).unwrap();
        let timing = Timing {
            pulse_us: 0,
            settle_us: 0,
            setup_us: 0,
        };
        NorBus::new(port, SerialShifter::new(bits), timing).unwrap()
    }

    #[test]
    fn test_dump_length() {
        for max in [0u32, 1, 0xFF, 0x3FF] {
            let mut out = Vec::new();
            let sink = LimitedSink {
                out: &mut out,
                limit: usize::MAX,
                full: false,
            };
            dump(&mut bus(10), sink, max, |_| {}).unwrap();
            assert_eq!(out.len(), max as usize + 1);
        }
    }

    #[test]
    fn test_dump_progress_reports() {
        let mut out = Vec::new();
        let sink = LimitedSink {
            out: &mut out,
            limit: usize::MAX,
            full: false,
        };
        let mut reports = Vec::new();
        dump(&mut bus(14), sink, 0x2FFF, |n| reports.push(n)).unwrap();
        assert_eq!(reports, [4096, 8192, 12288, 12288]);
    }

    #[test]
    fn test_dump_stops_at_failing_address() {
        let mut out = Vec::new();
        let sink = LimitedSink {
            out: &mut out,
            limit: 100,
            full: false,
        };
        let mut b = bus(10);
        let err = dump(&mut b, sink, 0x3FF, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            DumpError::Write {
                address: 100,
                error: Rejected
            }
        ));
        assert_eq!(err.address(), Some(100));
        assert_eq!(out.len(), 100);

        // Address 101 was never presented: the shifter loaded 0..=100 only
        let clock = PinMap::reference().pin(PinRole::ShiftClock).unwrap();
        assert_eq!(b.port().backend().rising_edges(clock), 101 * 11);
    }

    #[test]
    fn test_dump_sink_full() {
        let mut out = Vec::new();
        let sink = LimitedSink {
            out: &mut out,
            limit: 3,
            full: true,
        };
        let err = dump(&mut bus(10), sink, 0x3FF, |_| {}).unwrap_err();
        assert!(matches!(err, DumpError::SinkFull { address: 3 }));
    }

    #[test]
    fn test_dump_rejects_range_beyond_wiring() {
        let mut out = Vec::new();
        let sink = LimitedSink {
            out: &mut out,
            limit: usize::MAX,
            full: false,
        };
        let mut b = bus(10);
        let err = dump(&mut b, sink, 0x400, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            DumpError::Bus(Error::AddressOutOfRange {
                address: 0x400,
                max: 0x3FF
            })
        ));
        assert!(out.is_empty());
        assert!(b.port().backend().ops.is_empty());
    }

    #[test]
    fn test_dump_leaves_read_configuration() {
        let mut out = Vec::new();
        let sink = LimitedSink {
            out: &mut out,
            limit: usize::MAX,
            full: false,
        };
        let mut b = bus(10);
        dump(&mut b, sink, 0xF, |_| {}).unwrap();
        assert_eq!(crate::bus::direction(b.port()), Some(Direction::Input));
        let oe = PinMap::reference().output_enable;
        assert_eq!(b.port().backend().levels[&oe], Level::High);
    }
}
