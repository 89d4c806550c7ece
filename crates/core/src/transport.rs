//! Line framing over a duplex byte stream.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A line-oriented duplex channel to the driver.
pub trait Transport {
    /// Next line's raw bytes without the terminator, or `None` once the peer
    /// stops writing. Bytes are not checked for UTF-8 here; that is the codec's job.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Writes `line` plus a newline and flushes.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

pub type TcpTransport = LineTransport<BufReader<TcpStream>, TcpStream>;

impl<R: BufRead, W: Write> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl TcpTransport {
    /// Opens a TCP connection; `io_timeout` bounds every blocking read and write.
    pub fn connect(address: &str, port: u16, io_timeout: Option<Duration>) -> io::Result<Self> {
        let stream = TcpStream::connect((address, port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::new(reader, stream))
    }
}

impl<R: BufRead, W: Write> Transport for LineTransport<R, W> {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(Some(line))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
