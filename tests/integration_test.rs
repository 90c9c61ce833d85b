use byteorder::{ByteOrder, NativeEndian};
use flowcodec::bits::swap_fields;
use flowcodec::codec::{CodecError, FT_RWGENERIC, FT_RWSPLIT};
use flowcodec::record::{Address, ACK_FLAG, IPPROTO_TCP, IPPROTO_UDP, SYN_FLAG, TCPSTATE_EXPANDED};
use flowcodec::{
    length_for, Codec, Endian, FileFormat, FlowRecord, IoMode, LimitKind, RecordVersion,
    StreamContext,
};

const BASE: i64 = 1_577_836_800_000;

fn scenario_a() -> FlowRecord {
    FlowRecord {
        src_ip:        Address::V4(0x0A00_0001),
        dst_ip:        Address::V4(0x0A00_0002),
        bytes:         1500,
        packets:       1,
        start_time:    BASE,
        duration:      0,
        protocol:      IPPROTO_TCP,
        tcp_flags_all: SYN_FLAG,
        ..Default::default()
    }
}

/// A record every layout can hold.
fn storable() -> FlowRecord {
    FlowRecord {
        src_ip:        Address::V4(0xC0A8_0102),
        dst_ip:        Address::V4(0x0808_0808),
        next_hop_ip:   Address::V4(0xC0A8_0101),
        src_port:      1234,
        dst_port:      80,
        protocol:      IPPROTO_TCP,
        tcp_flags_all: SYN_FLAG | ACK_FLAG,
        packets:       10,
        bytes:         1000,
        start_time:    BASE + 1_000,
        duration:      1_000,
        input_snmp:    1,
        output_snmp:   2,
        sensor_id:     1,
        flow_type:     1,
        ..Default::default()
    }
}

fn context(format: FileFormat, version: u8) -> StreamContext {
    StreamContext::new(format, IoMode::Write)
        .with_version(version)
        .with_base_time(BASE)
        .with_header_sensor(1)
        .with_header_flow_type(1)
}

fn pack(ctx: &mut StreamContext, rec: &FlowRecord) -> Result<Vec<u8>, CodecError> {
    ctx.prepare()?;
    let mut buf = vec![0u8; usize::from(ctx.record_length())];
    ctx.pack_record(rec, &mut buf)?;
    Ok(buf)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn generic_v5_big_endian_layout() {
    let mut ctx = context(FileFormat::Generic, 5).with_byte_order(Endian::Big);
    let buf = pack(&mut ctx, &scenario_a()).unwrap();
    assert_eq!(buf.len(), 52);
    assert_eq!(&buf[40..44], &[0x0A, 0x00, 0x00, 0x01]);
    assert_eq!(buf[20], SYN_FLAG);

    let mut reader = StreamContext::new(FileFormat::Generic, IoMode::Read)
        .with_version(5)
        .with_byte_order(Endian::Big);
    reader.prepare().unwrap();
    assert_eq!(reader.unpack_record(&buf).unwrap(), scenario_a());
}

#[test]
fn split_v1_drops_milliseconds() {
    let rec = FlowRecord { start_time: BASE + 123, ..scenario_a() };
    let mut ctx = context(FileFormat::Split, 1);
    let buf = pack(&mut ctx, &rec).unwrap();
    assert_eq!(buf.len(), 22);

    let out = ctx.unpack_record(&buf).unwrap();
    assert_eq!(out.start_time, BASE);
    assert_eq!(out.duration, 0);
    assert_eq!((out.bytes, out.packets), (1500, 1));
}

#[test]
fn filter_v1_sensor_overflow() {
    let rec = FlowRecord { sensor_id: 64, ..scenario_a() };
    let err = pack(&mut context(FileFormat::Filter, 1), &rec).unwrap_err();
    assert!(matches!(err, CodecError::SensorOverflow { sensor: 64 }));
    assert_eq!(err.kind(), Some(LimitKind::SensorOverflow));
}

#[test]
fn web_v3_rejects_udp() {
    let rec = FlowRecord { protocol: IPPROTO_UDP, dst_port: 80, ..scenario_a() };
    let err = pack(&mut context(FileFormat::Www, 3), &rec).unwrap_err();
    assert!(matches!(err, CodecError::ProtocolMismatch { protocol: 17 }));
}

#[test]
fn ipv6routing_v3_clamps_on_read() {
    let rec = FlowRecord { packets: u32::MAX, bytes: u32::MAX, input_snmp: u16::MAX, ..storable() };
    let mut ctx = context(FileFormat::Ipv6Routing, 3);
    let mut buf = pack(&mut ctx, &rec).unwrap();
    NativeEndian::write_u32(&mut buf[28..32], 70_000);
    NativeEndian::write_u64(&mut buf[32..40], 5_000_000_000);
    assert_eq!(NativeEndian::read_u32(&buf[28..32]), 70_000);

    let out = ctx.unpack_record(&buf).unwrap();
    assert_eq!(out.input_snmp, u16::MAX);
    assert_eq!(out.packets, u32::MAX);
}

#[test]
fn flowcap_v6_resets_application() {
    let rec = FlowRecord { application: 0x1234, ..storable() };
    let mut v5 = context(FileFormat::Flowcap, 5);
    let buf = pack(&mut v5, &rec).unwrap();
    assert_eq!(NativeEndian::read_u16(&buf[22..24]), 0x1234);
    assert_eq!(v5.unpack_record(&buf).unwrap().application, 0x1234);

    let mut v6 = StreamContext::new(FileFormat::Flowcap, IoMode::Read).with_version(6);
    v6.prepare().unwrap();
    assert_eq!(v6.unpack_record(&buf).unwrap().application, 0);
}

// ── Every format and version ─────────────────────────────────────────────────

#[test]
fn every_layout_packs_to_its_length_and_back() {
    let rec = storable();
    for f in FileFormat::all() {
        for &v in f.versions() {
            let codec = Codec::select(f, v).unwrap();
            let ctx = context(f, v);
            let mut buf = vec![0u8; usize::from(length_for(f.id(), v))];
            assert_eq!(buf.len(), codec.record_len(), "{} v{}", f.name(), v);

            codec.encode(&ctx, &rec, &mut buf).unwrap_or_else(|e| panic!("{} v{}: {}", f.name(), v, e));
            let out = codec.decode(&ctx, &buf).unwrap();
            let tag = format!("{} v{}", f.name(), v);
            assert_eq!(out.src_ip, rec.src_ip, "{}", tag);
            assert_eq!(out.dst_ip, rec.dst_ip, "{}", tag);
            assert_eq!((out.src_port, out.dst_port), (rec.src_port, rec.dst_port), "{}", tag);
            assert_eq!(out.protocol, rec.protocol, "{}", tag);
            assert_eq!((out.packets, out.bytes), (rec.packets, rec.bytes), "{}", tag);
            assert_eq!(out.start_time, rec.start_time, "{}", tag);
            assert_eq!(out.duration, rec.duration, "{}", tag);
            assert_eq!(out.sensor_id, 1, "{}", tag);
        }
    }
}

#[test]
fn foreign_byte_order_is_the_swapped_native_layout() {
    let rec = storable();
    let foreign = if Endian::native() == Endian::Big { Endian::Little } else { Endian::Big };
    for f in FileFormat::all() {
        for &v in f.versions() {
            let codec = Codec::select(f, v).unwrap();
            let native = context(f, v);
            let other = context(f, v).with_byte_order(foreign);

            let mut a = vec![0u8; codec.record_len()];
            let mut b = vec![0u8; codec.record_len()];
            codec.encode(&native, &rec, &mut a).unwrap();
            codec.encode(&other, &rec, &mut b).unwrap();

            swap_fields(&mut a, codec.swap_table());
            assert_eq!(a, b, "{} v{}", f.name(), v);
            assert_eq!(codec.decode(&other, &b).unwrap(), codec.decode(&native, &{
                let mut n = b.clone();
                swap_fields(&mut n, codec.swap_table());
                n
            }).unwrap());
        }
    }
}

// ── Limits: clamp versus error ───────────────────────────────────────────────

#[test]
fn long_durations_clamp_or_fail_by_format() {
    let rec = FlowRecord { duration: 70_000_000, ..storable() };

    let mut flowcap = context(FileFormat::Flowcap, 5);
    let buf = pack(&mut flowcap, &rec).unwrap();
    assert_eq!(flowcap.unpack_record(&buf).unwrap().duration, 65_535_000);

    let err = pack(&mut context(FileFormat::Routed, 5), &rec).unwrap_err();
    assert!(matches!(err, CodecError::ElapsedOverflow { duration: 70_000_000 }));
}

#[test]
fn compact_volume_limits() {
    let bpp = FlowRecord { packets: 1, bytes: 16_384, ..storable() };
    assert!(matches!(
        pack(&mut context(FileFormat::Split, 5), &bpp),
        Err(CodecError::BppOverflow { bytes: 16_384, packets: 1 })
    ));

    let many = FlowRecord { packets: 67_108_864, bytes: 4_000_000_000, ..storable() };
    assert!(matches!(
        pack(&mut context(FileFormat::Filter, 5), &many),
        Err(CodecError::PacketsOverflow { packets: 67_108_864 })
    ));

    let none = FlowRecord { packets: 0, ..storable() };
    assert!(matches!(pack(&mut context(FileFormat::Routed, 5), &none), Err(CodecError::PacketsZero)));
}

// ── Decode sanitation ────────────────────────────────────────────────────────

#[test]
fn stray_expanded_bit_on_udp() {
    let rec = FlowRecord {
        protocol:          IPPROTO_UDP,
        dst_port:          53,
        tcp_state:         TCPSTATE_EXPANDED,
        tcp_flags_init:    SYN_FLAG,
        tcp_flags_session: ACK_FLAG,
        ..storable()
    };
    let layouts = [
        (FileFormat::Generic, 2),
        (FileFormat::Generic, 3),
        (FileFormat::Generic, 5),
        (FileFormat::Ipv6, 1),
        (FileFormat::Ipv6Routing, 1),
        (FileFormat::Ipv6Routing, 2),
    ];
    for (f, v) in layouts {
        let mut ctx = context(f, v);
        let buf = pack(&mut ctx, &rec).unwrap();
        let out = ctx.unpack_record(&buf).unwrap();
        if cfg!(feature = "tcpstate-fix") {
            assert_eq!(out.tcp_state & TCPSTATE_EXPANDED, 0, "{} v{}", f.name(), v);
            assert_eq!((out.tcp_flags_init, out.tcp_flags_session), (0, 0), "{} v{}", f.name(), v);
        } else {
            assert_eq!(out.tcp_state & TCPSTATE_EXPANDED, TCPSTATE_EXPANDED, "{} v{}", f.name(), v);
        }
    }
}

// ── Addresses ────────────────────────────────────────────────────────────────

#[test]
fn ipv4_only_layouts_and_ipv6() {
    let mapped = Address::V6([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 10, 0, 0, 1]);
    let rec = FlowRecord { src_ip: mapped, ..scenario_a() };
    let mut ctx = context(FileFormat::Generic, 5);
    let buf = pack(&mut ctx, &rec).unwrap();
    assert_eq!(ctx.unpack_record(&buf).unwrap().src_ip, Address::V4(0x0A00_0001));

    let pure = FlowRecord {
        src_ip: Address::V6([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
        ..scenario_a()
    };
    for f in [FileFormat::Generic, FileFormat::Split, FileFormat::Flowcap] {
        let mut ctx = context(f, f.default_version());
        assert!(matches!(pack(&mut ctx, &pure), Err(CodecError::UnsupportedIpv6)), "{}", f.name());
    }
}

#[cfg(feature = "ipv6")]
#[test]
fn ipv6_formats_keep_ipv6() {
    let rec = FlowRecord {
        src_ip: Address::V6([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
        dst_ip: Address::V6([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]),
        next_hop_ip: Address::V6([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
        ..storable()
    };
    for v in [1, 2, 3] {
        let mut ctx = context(FileFormat::Ipv6Routing, v);
        let buf = pack(&mut ctx, &rec).unwrap();
        let out = ctx.unpack_record(&buf).unwrap();
        assert_eq!((out.src_ip, out.dst_ip, out.next_hop_ip), (rec.src_ip, rec.dst_ip, rec.next_hop_ip));
    }
}

// ── Selector and stream state ────────────────────────────────────────────────

#[test]
fn selector_lengths_and_defaults() {
    assert_eq!(length_for(FT_RWGENERIC, 5), 52);
    assert_eq!(length_for(FT_RWSPLIT, 1), 22);
    assert_eq!(length_for(FT_RWSPLIT, 6), 0);
    assert_eq!(length_for(0x00, 1), 0);

    let mut ctx = StreamContext::new(FileFormat::Routed, IoMode::Write);
    ctx.prepare().unwrap();
    assert_eq!(ctx.record_version(), RecordVersion::Explicit(5));
    assert_eq!(ctx.record_length(), 32);
}

#[test]
fn header_length_must_match() {
    let mut ctx = StreamContext::new(FileFormat::Www, IoMode::Read)
        .with_version(5)
        .with_record_length(20);
    match ctx.prepare() {
        Err(CodecError::RecordLengthMismatch { format, version, expected, header }) => {
            assert_eq!((format, version, expected, header), ("FT_RWWWW", 5, 22, 20));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn wrong_buffer_length() {
    let mut ctx = context(FileFormat::Generic, 5);
    ctx.prepare().unwrap();
    let mut short = [0u8; 51];
    assert!(matches!(
        ctx.pack_record(&scenario_a(), &mut short),
        Err(CodecError::BufferLength { expected: 52, actual: 51 })
    ));
}

#[test]
fn base_times_at_the_edge_of_i64() {
    let routed = Codec::select(FileFormat::Routed, 5).unwrap();

    let ctx = StreamContext::new(FileFormat::Routed, IoMode::Read).with_base_time(i64::MAX - 10);
    let rec = routed.decode(&ctx, &[0xFF; 32]).unwrap();
    assert_eq!(rec.start_time, i64::MAX);

    let ctx = StreamContext::new(FileFormat::Routed, IoMode::Write).with_base_time(-1_000);
    let far = FlowRecord { start_time: i64::MAX, ..storable() };
    let mut buf = [0u8; 32];
    assert!(matches!(
        routed.encode(&ctx, &far, &mut buf),
        Err(CodecError::StartTimeOverflow { start_time: i64::MAX, base_time: -1_000 })
    ));
    assert_eq!(buf, [0u8; 32]);
}
