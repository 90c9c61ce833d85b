//! Record streams: fixed-length records over any `Read` or `Write`.
//!
//! # Writer
//! [`FlowWriter`] binds a [`StreamContext`] (preparing it if needed), then
//! packs each record into one reused wire buffer and writes it out.  The
//! bytes of a record that fails to pack are never written, so the stream
//! stays aligned on record boundaries.
//!
//! # Reader
//! [`FlowReader`] reads exactly one record length at a time and unpacks
//! it.  It is an [`Iterator`] over `Result<FlowRecord, CodecError>`; a clean
//! end of input ends the iteration, a partial trailing record yields one
//! `TruncatedRecord` error and then ends it.
//!
//! There is no container header here.  Callers that keep one read it first
//! and hand the stream over positioned at the first record.
//!
//! Every error produced by either side is tagged with the zero-based index
//! of the record it concerns (`CodecError::AtRecord`).

use std::io::{self, Read, Write};

use log::debug;

use crate::codec::CodecError;
use crate::record::FlowRecord;
use crate::stream::{StreamContext, StreamState};

fn bind(ctx: &mut StreamContext) -> Result<usize, CodecError> {
    if ctx.state() == StreamState::Unbound {
        ctx.prepare()?;
    }
    Ok(ctx.codec()?.record_len())
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct FlowWriter<W: Write> {
    writer:  W,
    ctx:     StreamContext,
    buf:     Vec<u8>,
    written: u64,
}

impl<W: Write> FlowWriter<W> {
    pub fn new(writer: W, mut ctx: StreamContext) -> Result<Self, CodecError> {
        let len = bind(&mut ctx)?;
        debug!(
            "writer open: {} v{:?}, {} bytes/record",
            ctx.codec()?.format().name(),
            ctx.record_version(),
            len
        );
        Ok(Self { writer, ctx, buf: vec![0u8; len], written: 0 })
    }

    /// Pack and write one record.
    pub fn write_record(&mut self, rec: &FlowRecord) -> Result<(), CodecError> {
        let index = self.written;
        self.ctx
            .pack_record(rec, &mut self.buf)
            .map_err(|e| e.at_record(index))?;
        self.writer
            .write_all(&self.buf)
            .map_err(|e| CodecError::from(e).at_record(index))?;
        self.written += 1;
        Ok(())
    }

    /// Write every record, stopping at the first failure.
    pub fn write_records<'a, I>(&mut self, records: I) -> Result<(), CodecError>
    where
        I: IntoIterator<Item = &'a FlowRecord>,
    {
        for rec in records {
            self.write_record(rec)?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> u64 { self.written }
    pub fn context(&self) -> &StreamContext { &self.ctx }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, CodecError> {
        self.writer.flush()?;
        debug!("writer closed after {} records", self.written);
        Ok(self.writer)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct FlowReader<R: Read> {
    reader: R,
    ctx:    StreamContext,
    buf:    Vec<u8>,
    read:   u64,
    done:   bool,
}

impl<R: Read> FlowReader<R> {
    pub fn new(reader: R, mut ctx: StreamContext) -> Result<Self, CodecError> {
        let len = bind(&mut ctx)?;
        debug!(
            "reader open: {} v{:?}, {} bytes/record",
            ctx.codec()?.format().name(),
            ctx.record_version(),
            len
        );
        Ok(Self { reader, ctx, buf: vec![0u8; len], read: 0, done: false })
    }

    /// Read as much of one record as the input holds.
    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0)  => break,
                Ok(n)  => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// The next record, or `None` at a clean end of input.
    pub fn read_record(&mut self) -> Result<Option<FlowRecord>, CodecError> {
        if self.done {
            return Ok(None);
        }
        let index = self.read;
        let filled = match self.fill() {
            Ok(n)  => n,
            Err(e) => {
                self.done = true;
                return Err(CodecError::from(e).at_record(index));
            }
        };
        if filled == 0 {
            self.done = true;
            debug!("reader reached end of input after {} records", self.read);
            return Ok(None);
        }
        if filled < self.buf.len() {
            self.done = true;
            return Err(CodecError::TruncatedRecord { expected: self.buf.len(), actual: filled }
                .at_record(index));
        }
        self.read += 1;
        self.ctx.unpack_record(&self.buf).map(Some).map_err(|e| e.at_record(index))
    }

    pub fn records_read(&self) -> u64 { self.read }
    pub fn context(&self) -> &StreamContext { &self.ctx }

    pub fn into_inner(self) -> R { self.reader }
}

impl<R: Read> Iterator for FlowReader<R> {
    type Item = Result<FlowRecord, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}
