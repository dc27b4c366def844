//! ADV CLI - Tool for inspecting and verifying ADV recordings.

use adv::adv::{AdvReader, FrameKind, StatusValue};
use adv::core::from_ticks;
use std::env;
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("ADV_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        "info" | "i" => {
            let path = require_file(&filtered_args, "info <file.adv>");
            cmd_info(path);
        }

        "index" | "x" => {
            let path = require_file(&filtered_args, "index <file.adv>");
            cmd_index(path);
        }

        "verify" | "check" => {
            let path = require_file(&filtered_args, "verify <file.adv>");
            cmd_verify(path);
        }

        "frame" | "f" => {
            if filtered_args.len() < 3 {
                eprintln!("Error: missing arguments");
                eprintln!("Usage: adv-cli frame <file.adv> <n>");
                std::process::exit(1);
            }
            let n = match filtered_args[2].parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("Error: frame number must be a non-negative integer");
                    std::process::exit(1);
                }
            };
            cmd_frame(filtered_args[1], n);
        }

        "help" | "h" | "-h" | "--help" => print_help(),

        // Default: if file exists, show info; otherwise error
        _ => {
            if Path::new(filtered_args[0]).exists() {
                cmd_info(filtered_args[0]);
            } else {
                eprintln!("Unknown command: {}", filtered_args[0]);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    }
}

fn print_help() {
    println!("adv-cli - ADV recording toolkit");
    println!();
    println!("USAGE:");
    println!("    adv-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file>              Show header, file tags and schema");
    println!("    x, index  <file>              List the frame index");
    println!("    verify    <file>              Recompute every checksum");
    println!("    f, frame  <file> <n>          Show one frame record");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose                 Debug output");
    println!("    -vv, --trace                  Trace output");
    println!("    -q, --quiet                   Errors only");
    println!();
    println!("The ADV_LOG environment variable overrides the log filter.");
}

fn require_file<'a>(args: &[&'a str], usage: &str) -> &'a str {
    if args.len() < 2 {
        eprintln!("Error: missing file argument");
        eprintln!("Usage: adv-cli {}", usage);
        std::process::exit(1);
    }
    args[1]
}

fn open_or_exit(path: &str) -> AdvReader {
    info!("Opening recording: {}", path);
    match AdvReader::open(path) {
        Ok(r) => r,
        Err(adv::Error::Incomplete) => {
            eprintln!("{} is incomplete: the recording was never finalized", path);
            if let Ok(header) = AdvReader::probe(path) {
                eprintln!("  format version {}", header.version);
            }
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn format_ticks(ticks: i64) -> String {
    match from_ticks(ticks) {
        Ok(t) => t.to_string(),
        Err(_) => format!("{} ticks", ticks),
    }
}

fn cmd_info(path: &str) {
    let reader = open_or_exit(path);
    debug!("Recording opened successfully");

    println!("File:     {}", path);
    println!("Version:  {}", reader.version());
    println!("Size:     {} bytes", reader.size());
    println!("Frames:   {}", reader.frame_count());
    println!();

    println!("File tags:");
    for (name, value) in reader.file_tags().iter() {
        println!("  {:<20} {}", name, value);
    }
    println!();

    println!("Image sections:");
    for layout in reader.layouts() {
        println!(
            "  [{}] {}x{} {}bpp {:?} baseline={:?} compression={:?} keyframe_interval={}",
            layout.id,
            layout.width,
            layout.height,
            layout.bpp,
            layout.encoding,
            layout.baseline,
            layout.compression,
            layout.keyframe_interval,
        );
    }
    println!();

    println!("Status tags:");
    for def in reader.status_tags() {
        println!("  [{}] {:<20} {}", def.index, def.name, def.tag_type);
    }

    if reader.frame_count() > 0 {
        let first = reader.read_frame(0);
        let last = reader.read_frame(reader.frame_count() - 1);
        if let (Ok(first), Ok(last)) = (first, last) {
            println!();
            println!("First frame: {}", format_ticks(first.timestamp));
            println!("Last frame:  {}", format_ticks(last.timestamp));
        }
    }
}

fn cmd_index(path: &str) {
    let reader = open_or_exit(path);

    println!("{:>8}  {:>12}  {:>10}", "frame", "offset", "length");
    for entry in reader.index().iter() {
        println!("{:>8}  {:>12}  {:>10}", entry.frame_no, entry.offset, entry.length);
    }
    println!();
    println!("{} entries", reader.index().len());
}

fn cmd_verify(path: &str) {
    let reader = open_or_exit(path);

    match reader.verify() {
        Ok(report) => {
            println!(
                "OK: {} frames, {} images, {} payload bytes",
                report.frames, report.images, report.payload_bytes
            );
        }
        Err(e) => {
            eprintln!("FAILED: {}", e);
            std::process::exit(3);
        }
    }
}

fn cmd_frame(path: &str, n: usize) {
    let reader = open_or_exit(path);

    let frame = match reader.read_frame(n) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to read frame {}: {}", n, e);
            std::process::exit(1);
        }
    };

    println!("Frame {}", frame.frame_no);
    println!("  timestamp: {} ({})", format_ticks(frame.timestamp), frame.timestamp);
    println!("  elapsed:   {}", frame.elapsed);
    println!("  exposure:  {}", frame.exposure);

    if !frame.status.is_empty() {
        println!("  status:");
        for (index, value) in frame.status.iter() {
            let name = reader
                .status_tags()
                .get(index as usize)
                .map(|d| d.name.as_str())
                .unwrap_or("?");
            println!("    {:<20} {}", name, format_status(value));
        }
    }

    match &frame.image {
        Some(image) => {
            let kind = match image.kind {
                FrameKind::Keyframe => "keyframe",
                FrameKind::Delta => "delta",
            };
            println!(
                "  image:     layout {} {} {} bytes stored ({} raw{}), crc32 {:08x}",
                image.layout_id,
                kind,
                image.payload.len(),
                image.raw_len,
                if image.compressed { ", compressed" } else { "" },
                image.checksum,
            );
            match reader.decode_pixels(n) {
                Ok(Some(pixels)) => {
                    let min = pixels.iter().copied().min().unwrap_or(0);
                    let max = pixels.iter().copied().max().unwrap_or(0);
                    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len().max(1) as f64;
                    println!("  pixels:    min {} max {} mean {:.2}", min, max, mean);
                }
                Ok(None) => {}
                Err(e) => eprintln!("  failed to decode pixels: {}", e),
            }
        }
        None => println!("  image:     none"),
    }
}

fn format_status(value: &StatusValue) -> String {
    match value {
        StatusValue::UInt8(v) => v.to_string(),
        StatusValue::UInt16(v) => v.to_string(),
        StatusValue::UInt32(v) => v.to_string(),
        StatusValue::UInt64(v) => v.to_string(),
        StatusValue::Real(v) => v.to_string(),
        StatusValue::FixedString(s) => format!("{:?}", s),
        StatusValue::List(items) => format!("{:?}", items),
    }
}
