pub mod bits;
pub mod record;
pub mod pack;
pub mod codec;
pub mod stream;
pub mod io_stream;
pub mod batch;

pub use bits::Endian;
pub use record::{Address, FlowRecord};
pub use codec::{length_for, limit_for, Codec, CodecError, FileFormat, LimitKind};
pub use stream::{FileHeader, IoMode, RecordVersion, StreamContext, StreamState};
pub use io_stream::{FlowReader, FlowWriter};
pub use batch::{pack_records, unpack_records};
