//! Stream context: the per-file state a record codec works against.
//!
//! A [`StreamContext`] carries the file header's record description
//! (format id, record version, record length), the file's byte order, and
//! the per-file defaults that compact layouts leave out of each record:
//! the base time and the header's sensor and flow type.
//!
//! # Lifecycle
//! ```text
//! Unbound --prepare()--> Prepared --first pack/unpack--> Active
//! ```
//! `prepare` resolves the header to a [`Codec`], substituting the format's
//! default version for writers that did not ask for one and filling in a
//! zero record length.  Changing the header afterwards unbinds the stream.

use log::{debug, error};

use crate::bits::Endian;
use crate::codec::{Codec, CodecError, FileFormat};
use crate::record::FlowRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Read,
    Write,
    Append,
}

/// Record version as requested in a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVersion {
    /// Let the format choose; only meaningful when writing.
    Default,
    Explicit(u8),
}

impl RecordVersion {
    /// Header byte meaning "any version".
    pub const ANY: u8 = 0xFF;

    pub fn from_wire(v: u8) -> Self {
        if v == Self::ANY { RecordVersion::Default } else { RecordVersion::Explicit(v) }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            RecordVersion::Default     => Self::ANY,
            RecordVersion::Explicit(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub format_id:      u8,
    pub record_version: RecordVersion,
    /// 0 until known.
    pub record_length:  u16,
}

impl FileHeader {
    pub fn new(format: FileFormat) -> Self {
        Self { format_id: format.id(), record_version: RecordVersion::Default, record_length: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unbound,
    Prepared,
    Active,
}

#[derive(Debug, Clone)]
pub struct StreamContext {
    header:           FileHeader,
    mode:             IoMode,
    byte_order:       Endian,
    base_time:        i64,
    header_sensor:    u16,
    header_flow_type: u8,
    state:            StreamState,
    codec:            Option<Codec>,
}

impl StreamContext {
    /// A native-order stream for `format` with no version chosen yet.
    pub fn new(format: FileFormat, mode: IoMode) -> Self {
        Self::from_header(FileHeader::new(format), mode)
    }

    pub fn from_header(header: FileHeader, mode: IoMode) -> Self {
        Self {
            header,
            mode,
            byte_order:       Endian::native(),
            base_time:        0,
            header_sensor:    0,
            header_flow_type: 0,
            state:            StreamState::Unbound,
            codec:            None,
        }
    }

    // ── Builder-style setters ───────────────────────────────────────────────

    pub fn with_version(mut self, version: u8) -> Self {
        self.set_record_version(RecordVersion::Explicit(version));
        self
    }

    pub fn with_byte_order(mut self, order: Endian) -> Self {
        self.byte_order = order;
        self
    }

    /// Base time in milliseconds; usually the start of the file's hour.
    pub fn with_base_time(mut self, base_time: i64) -> Self {
        self.base_time = base_time;
        self
    }

    pub fn with_header_sensor(mut self, sensor: u16) -> Self {
        self.header_sensor = sensor;
        self
    }

    pub fn with_header_flow_type(mut self, flow_type: u8) -> Self {
        self.header_flow_type = flow_type;
        self
    }

    pub fn with_record_length(mut self, len: u16) -> Self {
        self.set_record_length(len);
        self
    }

    // ── Header ──────────────────────────────────────────────────────────────

    pub fn header(&self) -> &FileHeader { &self.header }
    pub fn format_id(&self) -> u8 { self.header.format_id }
    pub fn record_version(&self) -> RecordVersion { self.header.record_version }
    pub fn record_length(&self) -> u16 { self.header.record_length }

    pub fn set_format_id(&mut self, id: u8) {
        self.header.format_id = id;
        self.unbind();
    }

    pub fn set_record_version(&mut self, version: RecordVersion) {
        self.header.record_version = version;
        self.unbind();
    }

    pub fn set_record_length(&mut self, len: u16) {
        self.header.record_length = len;
        self.unbind();
    }

    fn unbind(&mut self) {
        self.state = StreamState::Unbound;
        self.codec = None;
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn mode(&self) -> IoMode { self.mode }
    pub fn byte_order(&self) -> Endian { self.byte_order }
    pub fn base_time(&self) -> i64 { self.base_time }
    pub fn header_sensor(&self) -> u16 { self.header_sensor }
    pub fn header_flow_type(&self) -> u8 { self.header_flow_type }
    pub fn state(&self) -> StreamState { self.state }

    #[inline]
    pub fn byte_swap_required(&self) -> bool {
        self.byte_order.needs_swap()
    }

    /// The bound codec, once prepared.
    pub fn codec(&self) -> Result<Codec, CodecError> {
        self.codec.ok_or(CodecError::NotPrepared)
    }

    // ── Prepare ─────────────────────────────────────────────────────────────

    /// Bind the header to a codec.
    pub fn prepare(&mut self) -> Result<(), CodecError> {
        let format = FileFormat::from_id(self.header.format_id)
            .ok_or(CodecError::UnknownFormat(self.header.format_id))?;

        let version = match self.header.record_version {
            RecordVersion::Explicit(v) => v,
            RecordVersion::Default if self.mode == IoMode::Write => {
                let v = format.default_version();
                debug!("{}: no record version requested, using default {}", format.name(), v);
                self.header.record_version = RecordVersion::Explicit(v);
                v
            }
            RecordVersion::Default => {
                return Err(CodecError::UnsupportedVersion {
                    format:  format.name(),
                    version: RecordVersion::ANY,
                });
            }
        };

        let codec = Codec::select(format, version)?;
        let expected = codec.record_len() as u16;
        if self.header.record_length == 0 {
            debug!("{} v{}: header record length filled in as {}", format.name(), version, expected);
            self.header.record_length = expected;
        } else if self.header.record_length != expected {
            error!(
                "Record length mismatch for {} version {}: code = {} bytes; header = {} bytes",
                format.name(), version, expected, self.header.record_length
            );
            return Err(CodecError::RecordLengthMismatch {
                format: format.name(),
                version,
                expected,
                header: self.header.record_length,
            });
        }

        debug!(
            "prepared {} v{} ({} bytes/record, {} byte order, {:?})",
            format.name(), version, expected, self.byte_order.name(), self.mode
        );
        self.codec = Some(codec);
        self.state = StreamState::Prepared;
        Ok(())
    }

    // ── Records ─────────────────────────────────────────────────────────────

    /// Pack one record into `buf` (exactly one record long).
    pub fn pack_record(&mut self, rec: &FlowRecord, buf: &mut [u8]) -> Result<(), CodecError> {
        self.codec()?.encode(self, rec, buf)?;
        self.state = StreamState::Active;
        Ok(())
    }

    /// Unpack one record from `buf` (exactly one record long).
    pub fn unpack_record(&mut self, buf: &[u8]) -> Result<FlowRecord, CodecError> {
        let rec = self.codec()?.decode(self, buf)?;
        self.state = StreamState::Active;
        Ok(rec)
    }
}
