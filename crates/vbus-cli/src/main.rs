//! Command-line interface for the VBus specification engine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vbus_spec::config::{self, env_vars};
use vbus_spec::{Header, PacketId, RawSpecificationData, Specification, SpecificationOptions};

/// VBus packet tools - decode, describe and convert VBus data.
#[derive(Parser, Debug)]
#[command(name = "vbus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Language for names and formatting (defaults to $VBUS_LANGUAGE or "en").
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a packet payload into named fields.
    Decode {
        /// Packet ID, e.g. 00_0010_7721_10_0100.
        packet_id: String,
        /// Frame data as hex.
        hex: String,
        /// Advertised frame count (defaults to the data length).
        #[arg(long)]
        frames: Option<usize>,
        /// Overlay file restricting and renaming fields.
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// List the fields of a packet.
    Packet {
        /// Packet ID, e.g. 00_0010_7721_0100.
        packet_id: String,
    },
    /// Convert a value between two units.
    Convert {
        /// Value to convert.
        #[arg(allow_negative_numbers = true)]
        value: f64,
        /// Source unit code.
        from: String,
        /// Target unit code.
        to: String,
    },
    /// Load an overlay file and print it back in normalised form.
    Overlay {
        /// Path to the overlay file.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    match args.command {
        Command::Decode {
            packet_id,
            hex,
            frames,
            overlay,
        } => run_decode(args.language, &packet_id, &hex, frames, overlay.as_deref()),
        Command::Packet { packet_id } => run_packet(args.language, &packet_id),
        Command::Convert { value, from, to } => run_convert(args.language, value, &from, &to),
        Command::Overlay { path } => run_overlay(args.language, &path),
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "vbus=debug,vbus_spec=debug"
    } else {
        "vbus=info,vbus_spec=warn"
    };

    // Build the env filter for log level control
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if config::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Options from the environment, overridden by the command line.
fn options(language: Option<String>, overlay: Option<&Path>) -> Result<SpecificationOptions> {
    let mut options = SpecificationOptions::from_env()
        .with_context(|| format!("Failed to read overlay from ${}", env_vars::OVERLAY))?;
    if let Some(language) = language {
        options = options.with_language(language);
    }
    if let Some(path) = overlay {
        options = options
            .with_overlay_file(path)
            .with_context(|| format!("Failed to read overlay {}", path.display()))?;
    }
    Ok(options)
}

fn parse_packet_id(packet_id: &str) -> Result<PacketId> {
    PacketId::parse(packet_id).ok_or_else(|| anyhow::anyhow!("Invalid packet ID: {}", packet_id))
}

/// Decode a payload.
fn run_decode(
    language: Option<String>,
    packet_id: &str,
    data: &str,
    frames: Option<usize>,
    overlay: Option<&Path>,
) -> Result<()> {
    let id = parse_packet_id(packet_id)?;
    let frame_data = hex::decode(data.trim()).context("Frame data is not valid hex")?;
    let frame_count = frames.unwrap_or_else(|| frame_data.len().div_ceil(vbus_spec::header::BYTES_PER_FRAME));

    let spec = Specification::new(options(language, overlay)?);
    let header = Header::from_packet_id(&id).with_frames(frame_count, frame_data);
    tracing::debug!(
        "Decoding {} with {} frames ({} bytes)",
        id,
        header.frame_count,
        header.frame_data.len()
    );

    let fields = spec.packet_fields_for_headers(&[header])?;
    if fields.is_empty() {
        eprintln!("No known fields for packet {}", id);
    }
    for field in fields {
        println!("{}\t{}\t{}", field.id, field.name, field.format_text_value());
    }
    Ok(())
}

/// Describe a packet.
fn run_packet(language: Option<String>, packet_id: &str) -> Result<()> {
    let id = parse_packet_id(packet_id)?;
    let spec = Specification::new(options(language, None)?);
    let packet = spec.catalog().packet_spec_for_id(&id);

    println!("{}  {}", packet.packet_id, packet.full_name);
    println!("  from: {}", packet.source_device.full_name);
    println!("  to:   {}", packet.destination_device.full_name);
    for field in packet.packet_fields.iter() {
        println!(
            "{}\t{}\t{}",
            field.field_id,
            field.name.resolve(spec.language()),
            field.field_type.type_id
        );
    }
    Ok(())
}

/// Convert a value.
fn run_convert(language: Option<String>, value: f64, from: &str, to: &str) -> Result<()> {
    let spec = Specification::new(options(language, None)?);
    let converted = spec.convert_raw_value(value, from, to)?;
    if converted.unit.is_none_unit() {
        println!("{}", converted.raw_value);
    } else {
        println!("{} {}", converted.raw_value, converted.unit.unit_text);
    }
    Ok(())
}

/// Normalise an overlay file.
fn run_overlay(language: Option<String>, path: &Path) -> Result<()> {
    let data = RawSpecificationData::from_json_file(path)
        .with_context(|| format!("Failed to read overlay {}", path.display()))?;
    if data.is_empty() {
        tracing::warn!("Overlay {} lists no fields", path.display());
    }
    let spec = Specification::new(options(language, None)?.with_specification_data(data));

    if let Some(entries) = spec.filtered_packet_field_specs() {
        let unresolved = entries
            .iter()
            .filter(|entry| entry.packet_field_spec.is_none())
            .count();
        if unresolved > 0 {
            tracing::warn!("{} of {} overlay entries do not resolve to a known field", unresolved, entries.len());
        }
    }

    println!("{}", spec.store_specification_data().to_json()?);
    Ok(())
}
