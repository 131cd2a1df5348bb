//! The single output stream of a run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Line-oriented writer over a file or stdout.
///
/// Buffered; dropping the sink flushes it, so output written before an
/// early exit is never lost.
pub struct OutputSink<W: Write> {
    writer: BufWriter<W>,
}

impl OutputSink<Box<dyn Write>> {
    /// Open `path` for writing (truncating), or stdout when `None`.
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        let writer: Box<dyn Write> = match path {
            Some(p) => Box::new(File::create(p)?),
            None => Box::new(io::stdout()),
        };
        Ok(OutputSink::new(writer))
    }
}

impl<W: Write> OutputSink<W> {
    pub fn new(writer: W) -> Self {
        OutputSink {
            writer: BufWriter::new(writer),
        }
    }

    /// Write one result followed by a newline.
    pub fn write_result(&mut self, result: &str) -> io::Result<()> {
        self.writer.write_all(result.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(e) => panic!("flush failed: {}", e.error()),
        }
    }
}
