//! Batch conversion between a slice of records and one contiguous buffer.
//!
//! Records are independent once the stream is prepared, so both directions
//! split cleanly across workers.  With the `parallel` feature the work runs
//! on Rayon's global pool, each task packing into its own scratch buffer
//! inside [`Codec::encode`]; without it the same loop runs sequentially.
//!
//! Output order always matches input order, and when several records fail
//! the one with the lowest index is reported.
//!
//! [`Codec::encode`]: crate::codec::Codec::encode

use crate::codec::CodecError;
use crate::record::FlowRecord;
use crate::stream::StreamContext;

/// Pack `records` back to back.  `ctx` must already be prepared.
pub fn pack_records(ctx: &StreamContext, records: &[FlowRecord]) -> Result<Vec<u8>, CodecError> {
    let codec = ctx.codec()?;
    let len = codec.record_len();
    let mut out = vec![0u8; len * records.len()];

    #[cfg(feature = "parallel")]
    let results: Vec<Result<(), CodecError>> = {
        use rayon::prelude::*;

        out.par_chunks_mut(len)
            .zip(records.par_iter())
            .enumerate()
            .map(|(i, (chunk, rec))| codec.encode(ctx, rec, chunk).map_err(|e| e.at_record(i as u64)))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<(), CodecError>> = out
        .chunks_mut(len)
        .zip(records.iter())
        .enumerate()
        .map(|(i, (chunk, rec))| codec.encode(ctx, rec, chunk).map_err(|e| e.at_record(i as u64)))
        .collect();

    // Surface the first error, if any.
    for r in results {
        r?;
    }
    Ok(out)
}

/// Unpack every record in `buf`.  `ctx` must already be prepared, and
/// `buf` must hold a whole number of records.
pub fn unpack_records(ctx: &StreamContext, buf: &[u8]) -> Result<Vec<FlowRecord>, CodecError> {
    let codec = ctx.codec()?;
    let len = codec.record_len();
    let whole = buf.len() / len;
    let rest = buf.len() % len;
    if rest != 0 {
        return Err(CodecError::TruncatedRecord { expected: len, actual: rest }.at_record(whole as u64));
    }

    #[cfg(feature = "parallel")]
    let results: Vec<Result<FlowRecord, CodecError>> = {
        use rayon::prelude::*;

        buf.par_chunks(len)
            .enumerate()
            .map(|(i, chunk)| codec.decode(ctx, chunk).map_err(|e| e.at_record(i as u64)))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<FlowRecord, CodecError>> = buf
        .chunks(len)
        .enumerate()
        .map(|(i, chunk)| codec.decode(ctx, chunk).map_err(|e| e.at_record(i as u64)))
        .collect();

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FileFormat, LimitKind};
    use crate::record::{Address, IPPROTO_TCP, ACK_FLAG, PSH_FLAG};
    use crate::stream::IoMode;

    const BASE: i64 = 1_700_000_000_000;

    fn prepared(format: FileFormat) -> StreamContext {
        let mut ctx = StreamContext::new(format, IoMode::Write).with_base_time(BASE);
        ctx.prepare().unwrap();
        ctx
    }

    fn records(n: u32) -> Vec<FlowRecord> {
        (0..n)
            .map(|i| FlowRecord {
                src_ip:        Address::V4(0xAC10_0000 | i),
                dst_ip:        Address::V4(0xAC10_FFFF),
                src_port:      40_000 + (i % 1000) as u16,
                dst_port:      22,
                protocol:      IPPROTO_TCP,
                tcp_flags_all: ACK_FLAG | PSH_FLAG,
                packets:       2 + i % 7,
                bytes:         128 * (2 + i % 7),
                start_time:    BASE + i64::from(i),
                duration:      i % 5_000,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn batch_matches_record_by_record() {
        let ctx = prepared(FileFormat::Filter);
        let recs = records(500);
        let buf = pack_records(&ctx, &recs).unwrap();
        let codec = ctx.codec().unwrap();
        let len = codec.record_len();
        assert_eq!(buf.len(), 500 * len);

        let mut one = vec![0u8; len];
        for (i, rec) in recs.iter().enumerate() {
            codec.encode(&ctx, rec, &mut one).unwrap();
            assert_eq!(&buf[i * len..(i + 1) * len], &one[..], "record {}", i);
        }

        let back = unpack_records(&ctx, &buf).unwrap();
        assert_eq!(back.len(), recs.len());
        for (a, b) in back.iter().zip(&recs) {
            assert_eq!((a.src_ip, a.packets, a.bytes, a.start_time), (b.src_ip, b.packets, b.bytes, b.start_time));
        }
    }

    #[test]
    fn lowest_failing_index_is_reported() {
        let ctx = prepared(FileFormat::Routed);
        let mut recs = records(300);
        recs[250].start_time = BASE - 1;
        recs[120].start_time = BASE - 1;
        let err = pack_records(&ctx, &recs).unwrap_err();
        assert!(matches!(err, CodecError::AtRecord { index: 120, .. }));
        assert_eq!(err.kind(), Some(LimitKind::StartTimeUnderflow));
    }

    #[test]
    fn partial_buffer_is_truncated() {
        let ctx = prepared(FileFormat::Generic);
        let buf = pack_records(&ctx, &records(3)).unwrap();
        match unpack_records(&ctx, &buf[..buf.len() - 1]) {
            Err(CodecError::AtRecord { index: 2, source }) => assert!(matches!(
                *source,
                CodecError::TruncatedRecord { expected: 52, actual: 51 }
            )),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unprepared_context() {
        let ctx = StreamContext::new(FileFormat::Generic, IoMode::Write);
        assert!(matches!(pack_records(&ctx, &records(1)), Err(CodecError::NotPrepared)));
    }
}
