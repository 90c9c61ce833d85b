use clap::{Args, Parser, Subcommand};
use chrono::{DateTime, SecondsFormat};
use flowcodec::record::tcp_flags_string;
use flowcodec::{
    limit_for, pack_records, Endian, FileFormat, FlowReader, FlowRecord, FlowWriter, IoMode,
    LimitKind, StreamContext,
};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read};
use std::path::PathBuf;

const HOUR_MS: i64 = 3_600_000;

#[derive(Parser)]
#[command(name = "flowcodec", about = "Pack and unpack fixed-width binary flow records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StreamArgs {
    /// File format: generic, filter, split, flowcap, ipv6, ... (or FT_RW* names)
    #[arg(short, long)]
    format: String,
    /// Record version (writers default to the format's preferred version)
    #[arg(long)]
    version: Option<u8>,
    /// Base time: milliseconds since the epoch or an RFC 3339 timestamp
    #[arg(long)]
    base: Option<String>,
    /// Byte order of the records: big, little or native
    #[arg(long, default_value = "native")]
    byte_order: String,
    /// Sensor id stored in the file header
    #[arg(long, default_value_t = 0)]
    sensor: u16,
    /// Flow type stored in the file header
    #[arg(long, default_value_t = 0)]
    flowtype: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List every format with its versions and record lengths
    Formats,
    /// Print the representable ranges of one format version
    Limits {
        #[arg(short, long)]
        format: String,
        #[arg(long)]
        version: u8,
        /// Base time: milliseconds since the epoch or an RFC 3339 timestamp
        #[arg(long)]
        base: Option<String>,
    },
    /// Pack JSON records into wire records
    Encode {
        #[command(flatten)]
        stream: StreamArgs,
        /// One JSON record, a JSON array, or JSON lines
        #[arg(long)]
        json: Option<String>,
        /// File holding JSON records
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Write raw records here instead of printing hex
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Unpack wire records into JSON lines
    Decode {
        #[command(flatten)]
        stream: StreamArgs,
        /// Records as hex (whitespace ignored)
        #[arg(long)]
        hex: Option<String>,
        /// File holding raw records
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// One readable line per record instead of JSON
        #[arg(long)]
        text: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Cli::parse().command {

        // ── Formats ──────────────────────────────────────────────────────────
        Commands::Formats => {
            println!("{:<18} {:>6} {:>8}  Versions (record bytes)", "Format", "Id", "Default");
            for f in FileFormat::all() {
                let versions: Vec<String> = f
                    .versions()
                    .iter()
                    .map(|&v| format!("v{}:{}", v, f.record_len(v)))
                    .collect();
                println!("{:<18} {:>#6x} {:>8}  {}", f.name(), f.id(), f.default_version(), versions.join(" "));
            }
        }

        // ── Limits ───────────────────────────────────────────────────────────
        Commands::Limits { format, version, base } => {
            let format = parse_format(&format)?;
            if format.record_len(version) == 0 {
                return Err(format!("{} has no record version {}", format.name(), version).into());
            }
            let base = base.as_deref().map(parse_time).transpose()?.unwrap_or(0);
            println!("{} v{} ({} bytes/record)", format.name(), version, format.record_len(version));
            for kind in LimitKind::all() {
                let value = limit_for(format, version, kind, base);
                println!("  {:<22} {}", kind.name(), render_limit(kind, value));
            }
        }

        // ── Encode ───────────────────────────────────────────────────────────
        Commands::Encode { stream, json, input, output } => {
            let text = match (json, input) {
                (Some(s), _)    => s,
                (None, Some(p)) => std::fs::read_to_string(p)?,
                (None, None)    => return Err("either --json or --input is required".into()),
            };
            let records = parse_records(&text)?;
            let hour = records.first().map_or(0, |r| r.start_time.div_euclid(HOUR_MS).saturating_mul(HOUR_MS));
            let mut ctx = stream.context(IoMode::Write, hour)?;

            match output {
                Some(path) => {
                    let mut w = FlowWriter::new(BufWriter::new(File::create(&path)?), ctx)?;
                    w.write_records(&records)?;
                    let n = w.records_written();
                    let len = w.context().record_length();
                    w.finish()?;
                    println!("Wrote {} records ({} bytes each) to {}", n, len, path.display());
                }
                None => {
                    ctx.prepare()?;
                    let len = usize::from(ctx.record_length());
                    let buf = pack_records(&ctx, &records)?;
                    for rec in buf.chunks(len) {
                        println!("{}", hex::encode(rec));
                    }
                }
            }
        }

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { stream, hex: hex_text, input, text } => {
            let ctx = stream.context(IoMode::Read, 0)?;
            match (hex_text, input) {
                (Some(h), _) => {
                    let compact: String = h.split_whitespace().collect();
                    let bytes = hex::decode(compact)?;
                    print_records(FlowReader::new(Cursor::new(bytes), ctx)?, text)?;
                }
                (None, Some(p)) => {
                    let file = BufReader::new(File::open(p)?);
                    print_records(FlowReader::new(file, ctx)?, text)?;
                }
                (None, None) => return Err("either --hex or --input is required".into()),
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

impl StreamArgs {
    fn context(&self, mode: IoMode, default_base: i64) -> Result<StreamContext, Box<dyn Error>> {
        let format = parse_format(&self.format)?;
        let order = Endian::from_name(&self.byte_order)
            .ok_or_else(|| format!("unknown byte order '{}'", self.byte_order))?;
        let base = self.base.as_deref().map(parse_time).transpose()?.unwrap_or(default_base);

        let mut ctx = StreamContext::new(format, mode)
            .with_byte_order(order)
            .with_base_time(base)
            .with_header_sensor(self.sensor)
            .with_header_flow_type(self.flowtype);
        if let Some(v) = self.version {
            ctx = ctx.with_version(v);
        }
        Ok(ctx)
    }
}

fn parse_format(s: &str) -> Result<FileFormat, Box<dyn Error>> {
    FileFormat::from_name(s).ok_or_else(|| format!("unknown file format '{}'", s).into())
}

fn parse_time(s: &str) -> Result<i64, Box<dyn Error>> {
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    Ok(DateTime::parse_from_rfc3339(s)?.timestamp_millis())
}

/// A JSON array, or one JSON object per line.
fn parse_records(text: &str) -> Result<Vec<FlowRecord>, Box<dyn Error>> {
    let text = text.trim();
    if text.starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| -> Result<FlowRecord, Box<dyn Error>> { Ok(serde_json::from_str(l)?) })
        .collect()
}

fn print_records<R: Read>(reader: FlowReader<R>, text: bool) -> Result<(), Box<dyn Error>> {
    for rec in reader {
        let rec = rec?;
        if text {
            println!("{}", render_record(&rec));
        } else {
            println!("{}", serde_json::to_string(&rec)?);
        }
    }
    Ok(())
}

fn render_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

fn render_limit(kind: LimitKind, value: i64) -> String {
    match kind {
        _ if value == i64::MAX => "unbounded".into(),
        LimitKind::StartTimeUnderflow | LimitKind::StartTimeOverflow => {
            format!("{} ({})", value, render_time(value))
        }
        _ => value.to_string(),
    }
}

fn render_record(rec: &FlowRecord) -> String {
    format!(
        "{}  {:>15}:{:<5} -> {:>15}:{:<5}  proto {:>3}  pkts {:>10}  bytes {:>12}  [{}]  {}.{:03}s  sensor {} type {}",
        render_time(rec.start_time),
        rec.src_ip, rec.src_port,
        rec.dst_ip, rec.dst_port,
        rec.protocol,
        rec.packets,
        rec.bytes,
        tcp_flags_string(rec.tcp_flags_all),
        rec.elapsed_seconds(), rec.elapsed_msec(),
        rec.sensor_id, rec.flow_type,
    )
}
