// In: src/main.rs

//! `zipq`: compress a byte stream through the offload pipeline.
//!
//! Reads raw bytes from stdin (or `-i`), writes zlib or multi-member gzip to
//! stdout (or `-o`). Flags are layered over an optional JSON config file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use zipq::framing::inspect_frames;
use zipq::{Algorithm, Direction, EngineOptions, OffloadSession, SoftwareEngine, ZipqConfig, ZipqError};

//==================================================================================
// 1. Argument Parsing
//==================================================================================

#[derive(Debug, Parser)]
#[command(name = "zipq", version, about = "Compress a byte stream through the offload pipeline")]
struct Cli {
    /// zlib framing (single block, payload <= block size)
    #[arg(short = 'z', conflicts_with = "gzip")]
    zlib: bool,
    /// gzip framing, one member per block (default)
    #[arg(short = 'g')]
    gzip: bool,
    /// Number of compute queues
    #[arg(short = 'q', value_parser = clap::value_parser!(u64).range(1..))]
    queues: Option<u64>,
    /// Block size in bytes
    #[arg(short = 'b', value_parser = clap::value_parser!(u64).range(1..))]
    block_size: Option<u64>,
    /// Pipeline depth, i.e. slots in flight
    #[arg(short = 'c', value_parser = clap::value_parser!(u64).range(1..))]
    cache_depth: Option<u64>,
    /// Decompress (not supported)
    #[arg(short = 'd')]
    decompress: bool,
    /// Read from PATH instead of stdin
    #[arg(short = 'i', value_name = "PATH")]
    input: Option<String>,
    /// Write to PATH instead of stdout
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<String>,
    /// JSON session config; flags override it
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<String>,
    /// List the framed blocks of the input and exit
    #[arg(long)]
    list: bool,
    /// Log at info level, or debug when repeated
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
    /// Append the log to PATH instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,
}

impl Cli {
    /// The session config: file first, then flags on top.
    fn to_config(&self) -> Result<ZipqConfig, ZipqError> {
        let mut config = match &self.config_path {
            Some(path) => ZipqConfig::from_json_file(path)?,
            None => ZipqConfig::default(),
        };
        if self.zlib {
            config.algorithm = Algorithm::Zlib;
        } else if self.gzip {
            config.algorithm = Algorithm::Gzip;
        }
        if let Some(queues) = self.queues {
            config.queue_count = to_usize("-q", queues)?;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = to_usize("-b", block_size)?;
        }
        if let Some(cache_depth) = self.cache_depth {
            config.cache_depth = to_usize("-c", cache_depth)?;
        }
        if self.decompress {
            config.direction = Direction::Inflate;
        }
        Ok(config)
    }
}

fn to_usize(flag: &str, value: u64) -> Result<usize, ZipqError> {
    usize::try_from(value)
        .map_err(|_| ZipqError::InvalidConfig(format!("{} {} is out of range", flag, value)))
}

//==================================================================================
// 2. Logging
//==================================================================================

fn init_logging(verbosity: u8, log_file: Option<&str>) -> Result<(), ZipqError> {
    let mut builder = env_logger::Builder::new();

    builder.is_test(false);
    builder.filter_level(match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    });
    builder.parse_default_env();

    // Custom formatter: just print the level and message
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    if let Some(filename) = log_file {
        let file = OpenOptions::new().append(true).create(true).open(filename)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    let _ = builder.try_init();
    Ok(())
}

//==================================================================================
// 3. Commands
//==================================================================================

/// Opens the input and reports its length, which the session needs up front.
fn open_input(path: Option<&str>) -> Result<(Box<dyn Read>, u64), ZipqError> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok((Box::new(BufReader::new(file)), len))
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin().lock().read_to_end(&mut bytes)?;
            let len = bytes.len() as u64;
            Ok((Box::new(io::Cursor::new(bytes)), len))
        }
    }
}

fn open_output(path: Option<&str>) -> Result<Box<dyn Write>, ZipqError> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn compress(cli: &Cli) -> Result<(), ZipqError> {
    let config = cli.to_config()?;
    let mut session = OffloadSession::new(config, SoftwareEngine::new(EngineOptions::default()))?;

    let (source, source_len) = open_input(cli.input.as_deref())?;
    let sink = open_output(cli.output.as_deref())?;
    let stats = session.run(source, source_len, sink)?;
    log::info!("{}", stats);
    Ok(())
}

fn list(cli: &Cli) -> Result<(), ZipqError> {
    let config = cli.to_config()?;
    let (mut source, _) = open_input(cli.input.as_deref())?;
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;

    let mut out = open_output(cli.output.as_deref())?;
    for (i, frame) in inspect_frames(config.algorithm, &bytes)?.iter().enumerate() {
        writeln!(
            out,
            "{:>6}  offset {:>12}  header {:>2}  payload {:>10}",
            i, frame.offset, frame.header_len, frame.payload_len
        )?;
    }
    out.flush()?;
    Ok(())
}

//==================================================================================
// 4. Entry Point
//==================================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("zipq: cannot open log file: {}", err);
        return ExitCode::from(2);
    }

    let result = if cli.list { list(&cli) } else { compress(&cli) };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zipq: {:?} fault: {}", err.kind(), err);
            ExitCode::from(1)
        }
    }
}
