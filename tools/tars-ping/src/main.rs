// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tars-ping - TARS servant ping tool
//!
//! Sends `tars_ping` calls to a servant and reports round-trip latency,
//! decodes captured request/response frames, and prints the default
//! client configuration.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tars_rpc::codec::Value;
use tars_rpc::protocol::{return_code_name, PackageStatus, PING_FUNC};
use tars_rpc::{ClientConfig, Communicator, InvokeOptions, Protocol, TarsProtocol};

/// TARS servant ping tool
#[derive(Parser, Debug)]
#[command(name = "tars-ping")]
#[command(version = "0.1.0")]
#[command(about = "Ping TARS servants and decode frames")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Ping a servant through a direct object reference
    Ping {
        /// Object reference, e.g. "App.Server.Obj@tcp -h 10.0.0.1 -p 10000"
        obj: String,

        /// Number of calls
        #[arg(short = 'n', long, default_value = "5")]
        count: u32,

        /// Per-call timeout in milliseconds
        #[arg(long, default_value = "3000")]
        timeout_ms: u64,

        /// Pause between calls in milliseconds
        #[arg(short, long, default_value = "200")]
        interval_ms: u64,
    },
    /// Decode a captured frame (4-byte length header included)
    Decode {
        /// File holding one frame
        file: PathBuf,

        /// Envelope type
        #[arg(short, long, value_enum, default_value = "auto")]
        kind: FrameKind,
    },
    /// Print the default client configuration as TOML
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FrameKind {
    Auto,
    Request,
    Response,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match &args.mode {
        Mode::Ping {
            obj,
            count,
            timeout_ms,
            interval_ms,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_ping(obj, *count, *timeout_ms, *interval_ms))
        }
        Mode::Decode { file, kind } => run_decode(file, *kind),
        Mode::Config => {
            print!("{}", ClientConfig::default().to_toml()?);
            Ok(())
        }
    }
}

async fn run_ping(
    obj: &str,
    count: u32,
    timeout_ms: u64,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_millis(timeout_ms);
    let comm = Communicator::new(ClientConfig::default().with_request_timeout(timeout))?;
    let proxy = comm.string_to_proxy(obj).await?;

    eprintln!("{} PING {}", ">>>".green().bold(), proxy.name());

    let mut latencies = Vec::with_capacity(count as usize);
    let mut failed = 0u32;
    for seq in 1..=count {
        let start = Instant::now();
        let result = proxy
            .invoke(PING_FUNC, Vec::new(), InvokeOptions::new().with_timeout(timeout))
            .await;
        let rtt = start.elapsed();
        match result {
            Ok(_) => {
                let us = rtt.as_secs_f64() * 1_000_000.0;
                println!("seq={} time={:.1} us", seq, us);
                latencies.push(us);
            }
            Err(e) => {
                println!("seq={} {}", seq, e.to_string().red());
                failed += 1;
            }
        }
        if seq < count && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    comm.shutdown(Duration::from_millis(100)).await;
    print_summary(&latencies, failed);
    Ok(())
}

fn print_summary(latencies: &[f64], failed: u32) {
    let total = latencies.len() + failed as usize;
    println!();
    println!(
        "{} {} calls, {} ok, {} failed",
        "---".dimmed(),
        total,
        latencies.len(),
        failed
    );
    if latencies.is_empty() {
        return;
    }
    let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
    let max = latencies.iter().copied().fold(0.0, f64::max);
    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
    println!("rtt min/avg/max = {:.1}/{:.1}/{:.1} us", min, mean, max);
}

fn run_decode(file: &Path, kind: FrameKind) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    let protocol = TarsProtocol::default();
    let len = match protocol.parse_package(&bytes) {
        PackageStatus::Complete(len) => len,
        PackageStatus::Incomplete => return Err("truncated frame".into()),
        PackageStatus::Error(declared) => {
            return Err(format!("bad frame length {}", declared).into())
        }
    };
    if len < bytes.len() {
        eprintln!(
            "{}: {} trailing bytes ignored",
            "Warning".yellow(),
            bytes.len() - len
        );
    }
    let frame = &bytes[..len];

    let payload = match kind {
        FrameKind::Request => print_request(&protocol, frame)?,
        FrameKind::Response => print_response(&protocol, frame)?,
        FrameKind::Auto => match print_request(&protocol, frame) {
            Ok(payload) => payload,
            Err(_) => print_response(&protocol, frame)?,
        },
    };

    println!("{}", "payload:".bold());
    match Value::decode_fields(&payload) {
        Ok(fields) => println!("{}", Value::render_fields(&fields)),
        Err(_) => println!("  {} opaque bytes", payload.len()),
    }
    Ok(())
}

fn print_request(
    protocol: &TarsProtocol,
    frame: &[u8],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let req = protocol.request_unpack(frame)?;
    println!("{}", "request".green().bold());
    println!("  version      {}", req.version);
    println!("  packet_type  {}", req.packet_type);
    println!("  message_type {:#x}", req.message_type);
    println!("  request_id   {}", req.request_id);
    println!("  servant      {}", req.servant_name);
    println!("  func         {}", req.func_name);
    println!("  timeout      {} ms", req.timeout);
    println!("  context      {:?}", req.context);
    println!("  status       {:?}", req.status);
    Ok(req.buffer)
}

fn print_response(
    protocol: &TarsProtocol,
    frame: &[u8],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let rsp = protocol.response_unpack(frame)?;
    println!("{}", "response".green().bold());
    println!("  version      {}", rsp.version);
    println!("  packet_type  {}", rsp.packet_type);
    println!("  message_type {:#x}", rsp.message_type);
    println!("  request_id   {}", rsp.request_id);
    println!("  ret          {} ({})", rsp.ret, return_code_name(rsp.ret));
    println!("  result_desc  {}", rsp.result_desc);
    println!("  status       {:?}", rsp.status);
    println!("  context      {:?}", rsp.context);
    Ok(rsp.buffer)
}
