// Command-line front end for windelta.
//
// `decode` windows an input stream and writes the reconstructed bytes,
// `inspect` lists the windows a configuration would produce, `config` prints
// build details.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::io::{DEFAULT_CHUNK_SIZE, WindowSummary, decode_file, decode_to_writer, inspect_reader};
use crate::stream::{CutStrategy, DEFAULT_MASK_BITS, DEFAULT_WINDOW_CAPACITY, DecoderOptions};
use crate::window::{BuilderKind, DEFAULT_MIN_RUN, NoBase};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const CLI_DEFAULT_CAPACITY: u64 = 64 * 1024;
const CLI_DEFAULT_MIN_LEN: u64 = 2 * 1024;
const CLI_MAX_CAPACITY: u64 = 1 << 30; // 1 GiB

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

/// Byte size with optional K, M or G suffix.
fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

/// A single delimiter byte: a literal ASCII character, an escape
/// (`\n`, `\r`, `\t`, `\0`) or a hex value (`0x1e`).
fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\n" => return Ok(b'\n'),
        "\\r" => return Ok(b'\r'),
        "\\t" => return Ok(b'\t'),
        "\\0" => return Ok(0),
        _ => {}
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|e| format!("invalid delimiter '{s}': {e}"));
    }
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(format!(
            "invalid delimiter '{s}': expected one ASCII character, an escape or 0xNN"
        )),
    }
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Streaming window decoder.
#[derive(Parser, Debug)]
#[command(
    name = "windelta",
    version,
    about = "Streaming window decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Window an input stream and write the reconstructed output.
    Decode(DecodeArgs),
    /// Print one line per window.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Cut only when a window is full.
    Fixed,
    /// Cut after each delimiter byte.
    Delimited,
    /// Cut at content-defined boundaries.
    Content,
}

#[derive(Args, Debug)]
struct WindowingArgs {
    /// Window capacity (supports K/M/G suffix).
    #[arg(long, value_parser = parse_byte_size, default_value_t = CLI_DEFAULT_CAPACITY)]
    capacity: u64,

    /// Where windows end before reaching capacity.
    #[arg(long, value_enum, default_value_t = PolicyArg::Fixed)]
    policy: PolicyArg,

    /// Delimiter byte for `--policy delimited`.
    #[arg(long, value_parser = parse_delimiter, default_value = "\\n")]
    delimiter: u8,

    /// Minimum window length for `--policy content` (supports K/M/G suffix).
    #[arg(long = "min-len", value_parser = parse_byte_size, default_value_t = CLI_DEFAULT_MIN_LEN)]
    min_len: u64,

    /// Hash bits that must be zero at a content-defined boundary.
    #[arg(long = "mask-bits", value_parser = clap::value_parser!(u32).range(1..=32), default_value_t = DEFAULT_MASK_BITS)]
    mask_bits: u32,

    /// Emit RUN instructions for runs of at least this many equal bytes.
    #[arg(long = "run-length", num_args = 0..=1, default_missing_value = "8")]
    run_length: Option<usize>,

    /// Bytes handed to the decoder per read (supports K/M/G suffix).
    #[arg(long = "chunk-size", value_parser = parse_byte_size, default_value_t = DEFAULT_CHUNK_SIZE as u64)]
    chunk_size: u64,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Input file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Check/compute only (do not write output).
    #[arg(long = "check-only")]
    no_output: bool,

    #[command(flatten)]
    windowing: WindowingArgs,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    #[command(flatten)]
    windowing: WindowingArgs,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Decode,
    Inspect,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    no_output: bool,
    json_output: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    capacity: u64,
    decoder: DecoderOptions,
    chunk_size: usize,
}

fn decoder_options(args: &WindowingArgs) -> DecoderOptions {
    let strategy = match args.policy {
        PolicyArg::Fixed => CutStrategy::Fixed,
        PolicyArg::Delimited => CutStrategy::Delimited(args.delimiter),
        PolicyArg::Content => CutStrategy::ContentDefined {
            min_len: usize::try_from(args.min_len).unwrap_or(usize::MAX),
            mask_bits: args.mask_bits,
        },
    };
    let builder = match args.run_length {
        Some(min_run) => BuilderKind::RunLength { min_run },
        None => BuilderKind::Literal,
    };
    DecoderOptions::default()
        .with_capacity(usize::try_from(args.capacity).unwrap_or(usize::MAX))
        .with_strategy(strategy)
        .with_builder(builder)
}

fn chunk_size(args: &WindowingArgs) -> usize {
    usize::try_from(args.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE)
}

fn resolve_options(cli: Cli) -> Options {
    let quiet = cli.quiet;
    let verbose = cli.verbose.min(2);
    let force = cli.force;
    let json_output = cli.json_output;

    match cli.command {
        Cmd::Decode(args) => Options {
            command: Command::Decode,
            use_stdout: args.stdout,
            force,
            quiet,
            verbose,
            no_output: args.no_output,
            json_output,
            capacity: args.windowing.capacity,
            decoder: decoder_options(&args.windowing),
            chunk_size: chunk_size(&args.windowing),
            input_file: args.input.or(args.input_pos),
            output_file: args.output.or(args.output_pos),
        },
        Cmd::Inspect(args) => Options {
            command: Command::Inspect,
            use_stdout: true,
            force,
            quiet,
            verbose,
            no_output: false,
            json_output,
            capacity: args.windowing.capacity,
            decoder: decoder_options(&args.windowing),
            chunk_size: chunk_size(&args.windowing),
            input_file: args.input.or(args.input_pos),
            output_file: None,
        },
        Cmd::Config => Options {
            command: Command::Config,
            use_stdout: false,
            force,
            quiet,
            verbose,
            no_output: false,
            json_output,
            capacity: DEFAULT_WINDOW_CAPACITY as u64,
            decoder: DecoderOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            input_file: None,
            output_file: None,
        },
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("windelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn open_input(opts: &Options) -> Result<Box<dyn Read>, i32> {
    match &opts.input_file {
        Some(path) => match File::open(path) {
            Ok(f) => Ok(Box::new(BufReader::with_capacity(BUF_SIZE, f))),
            Err(e) => {
                eprintln!("windelta: input file: {}: {e}", path.display());
                Err(1)
            }
        },
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config(opts: &Options) -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    let adler32 = cfg!(feature = "adler32") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    if opts.json_output {
        let json = serde_json::json!({
            "command": "config",
            "version": version,
            "adler32_simd": adler32 == 1,
            "file_io": file_io == 1,
            "default_window_capacity": DEFAULT_WINDOW_CAPACITY,
            "cli_default_capacity": CLI_DEFAULT_CAPACITY,
            "cli_max_capacity": CLI_MAX_CAPACITY,
            "default_chunk_size": DEFAULT_CHUNK_SIZE,
            "default_min_run": DEFAULT_MIN_RUN,
            "default_mask_bits": DEFAULT_MASK_BITS,
            "pointer_size": ptr_size,
        });
        eprintln!("{json:#}");
        return 0;
    }

    eprintln!("windelta version {version}");

    eprintln!("ADLER32_SIMD={adler32}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("DEFAULT_WINDOW_CAPACITY={DEFAULT_WINDOW_CAPACITY}");
    eprintln!("CLI_DEFAULT_CAPACITY={CLI_DEFAULT_CAPACITY}");
    eprintln!("CLI_MAX_CAPACITY={CLI_MAX_CAPACITY}");
    eprintln!("DEFAULT_CHUNK_SIZE={DEFAULT_CHUNK_SIZE}");
    eprintln!("DEFAULT_MIN_RUN={DEFAULT_MIN_RUN}");
    eprintln!("DEFAULT_MASK_BITS={DEFAULT_MASK_BITS}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    // File to file goes through `decode_file` for the output checksum.
    if !opts.no_output
        && !opts.use_stdout
        && let (Some(input), Some(output)) = (&opts.input_file, &opts.output_file)
    {
        if output.exists() && !opts.force {
            eprintln!(
                "windelta: output file exists, use -f to overwrite: {}",
                output.display()
            );
            return 1;
        }
        return match decode_file(input, output, None, opts.decoder.clone(), opts.chunk_size) {
            Ok(stats) => {
                if opts.verbose > 0 && !opts.quiet {
                    eprintln!(
                        "windelta: decoder: input size: {}, output size: {}, windows: {}",
                        stats.input_size, stats.output_size, stats.windows
                    );
                }
                if opts.json_output {
                    let json = serde_json::json!({
                        "command": "decode",
                        "input_size": stats.input_size,
                        "output_size": stats.output_size,
                        "windows": stats.windows,
                        "chunk_size": stats.chunk_size,
                        "output_sha256": stats.output_sha256.as_ref().map(|d| hex(d)),
                    });
                    eprintln!("{json:#}");
                }
                0
            }
            Err(e) => {
                eprintln!("windelta: {e}");
                1
            }
        };
    }

    let reader = match open_input(opts) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let writer: Box<dyn Write> = if opts.no_output {
        Box::new(io::sink())
    } else if let Some(path) = opts.output_file.as_ref().filter(|_| !opts.use_stdout) {
        if path.exists() && !opts.force {
            eprintln!(
                "windelta: output file exists, use -f to overwrite: {}",
                path.display()
            );
            return 1;
        }
        match File::create(path) {
            Ok(f) => Box::new(BufWriter::with_capacity(BUF_SIZE, f)),
            Err(e) => {
                eprintln!("windelta: output file: {}: {e}", path.display());
                return 1;
            }
        }
    } else {
        Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()))
    };

    match decode_to_writer(reader, writer, NoBase, opts.decoder.clone(), opts.chunk_size) {
        Ok((_, stats)) => {
            if opts.verbose > 0 && !opts.quiet {
                eprintln!(
                    "windelta: decoder: output size: {}, windows: {}",
                    stats.bytes_delivered, stats.windows_delivered
                );
            }
            if opts.json_output {
                let json = serde_json::json!({
                    "command": "decode",
                    "input_size": stats.bytes_ingested,
                    "output_size": stats.bytes_delivered,
                    "windows": stats.windows_delivered,
                });
                eprintln!("{json:#}");
            }
            0
        }
        Err(e) => {
            eprintln!("windelta: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn summary_line(s: &WindowSummary) -> String {
    let instructions: Vec<String> = s.instructions.iter().map(|i| i.to_string()).collect();
    format!(
        "{:>8}  {:>12}  {:>8}  {:08x}  {}",
        s.index,
        s.stream_offset,
        s.len,
        s.checksum,
        instructions.join(", ")
    )
}

fn summary_json(s: &WindowSummary) -> serde_json::Value {
    let instructions: Vec<String> = s.instructions.iter().map(|i| i.to_string()).collect();
    serde_json::json!({
        "index": s.index,
        "offset": s.stream_offset,
        "len": s.len,
        "target_len": s.target_len,
        "adler32": format!("{:08x}", s.checksum),
        "instructions": instructions,
    })
}

fn cmd_inspect(opts: &Options) -> i32 {
    let reader = match open_input(opts) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let (summaries, stats) = match inspect_reader(reader, opts.decoder.clone(), opts.chunk_size) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("windelta: {e}");
            return 1;
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let written = if opts.json_output {
        let json = serde_json::json!({
            "command": "inspect",
            "capacity": opts.capacity,
            "bytes": stats.bytes_delivered,
            "windows": summaries.iter().map(summary_json).collect::<Vec<_>>(),
        });
        writeln!(out, "{json:#}")
    } else {
        writeln!(
            out,
            "{:>8}  {:>12}  {:>8}  {:>8}  instructions",
            "window", "offset", "length", "adler32"
        )
        .and_then(|()| {
            summaries
                .iter()
                .try_for_each(|s| writeln!(out, "{}", summary_line(s)))
        })
    };

    if let Err(e) = written.and_then(|()| out.flush()) {
        eprintln!("windelta: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "windelta: inspect: {} bytes in {} windows",
            stats.bytes_delivered, stats.windows_delivered
        );
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if opts.capacity == 0 || opts.capacity > CLI_MAX_CAPACITY {
        eprintln!(
            "windelta: --capacity: window capacity {} must be between 1 and {CLI_MAX_CAPACITY}",
            opts.capacity
        );
        process::exit(1);
    }

    // Warn if -c overrides output filename.
    if opts.use_stdout
        && opts.command == Command::Decode
        && let Some(path) = opts.output_file.take()
        && !opts.quiet
    {
        eprintln!(
            "windelta: warning: -c option overrides output filename: {}",
            path.display()
        );
    }

    let exit_code = match opts.command {
        Command::Decode => cmd_decode(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(&opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Instruction;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("windelta".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    #[test]
    fn parse_byte_size_suffixes() {
        assert_eq!(parse_byte_size("1").unwrap(), 1);
        assert_eq!(parse_byte_size("2K").unwrap(), 2 * 1024);
        assert_eq!(parse_byte_size("3m").unwrap(), 3 * 1024 * 1024);
        assert_eq!(parse_byte_size("4G").unwrap(), 4 * 1024 * 1024 * 1024);
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("12Q").is_err());
    }

    #[test]
    fn parse_delimiter_forms() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("\\n").unwrap(), b'\n');
        assert_eq!(parse_delimiter("\\0").unwrap(), 0);
        assert_eq!(parse_delimiter("0x1e").unwrap(), 0x1e);
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("0xzz").is_err());
    }

    #[test]
    fn decode_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "--quiet",
            "decode",
            "--capacity",
            "4K",
            "--check-only",
            "in.bin",
            "out.bin",
        ]);
        assert_eq!(opts.command, Command::Decode);
        assert!(opts.no_output);
        assert!(opts.quiet);
        assert_eq!(opts.capacity, 4096);
        assert_eq!(opts.decoder.capacity, 4096);
        assert_eq!(opts.decoder.strategy, CutStrategy::Fixed);
        assert_eq!(opts.input_file, Some(PathBuf::from("in.bin")));
        assert_eq!(opts.output_file, Some(PathBuf::from("out.bin")));
    }

    #[test]
    fn long_form_paths() {
        let opts = parse_opts(&["decode", "--input", "a", "--output", "b"]);
        assert_eq!(opts.input_file, Some(PathBuf::from("a")));
        assert_eq!(opts.output_file, Some(PathBuf::from("b")));
    }

    #[test]
    fn policy_flags_map_to_strategy() {
        let delimited = parse_opts(&["decode", "--policy", "delimited", "--delimiter", ";"]);
        assert_eq!(delimited.decoder.strategy, CutStrategy::Delimited(b';'));

        let content = parse_opts(&[
            "inspect",
            "--policy",
            "content",
            "--min-len",
            "1K",
            "--mask-bits",
            "10",
        ]);
        assert_eq!(
            content.decoder.strategy,
            CutStrategy::ContentDefined {
                min_len: 1024,
                mask_bits: 10
            }
        );
    }

    #[test]
    fn run_length_flag() {
        let bare = parse_opts(&["decode", "in", "out", "--run-length"]);
        assert!(matches!(
            bare.decoder.builder,
            BuilderKind::RunLength { min_run: 8 }
        ));
        let explicit = parse_opts(&["decode", "--run-length=3", "in"]);
        assert!(matches!(
            explicit.decoder.builder,
            BuilderKind::RunLength { min_run: 3 }
        ));
        let off = parse_opts(&["decode", "in"]);
        assert!(matches!(off.decoder.builder, BuilderKind::Literal));
    }

    #[test]
    fn global_stdio_and_force_flags() {
        let opts = parse_opts(&["--force", "decode", "--stdout", "in", "out"]);
        assert!(opts.use_stdout);
        assert!(opts.force);
    }

    #[test]
    fn verbose_is_capped() {
        let verbose = parse_opts(&["--verbose", "--verbose", "--verbose", "decode", "in", "out"]);
        assert_eq!(verbose.verbose, 2);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let argv = ["windelta", "-q", "-v", "config"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn mask_bits_are_range_checked() {
        let argv = ["windelta", "inspect", "--policy", "content", "--mask-bits", "40"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn inspect_and_config_map() {
        let inspect = parse_opts(&["inspect", "--chunk-size", "1K", "in"]);
        assert_eq!(inspect.command, Command::Inspect);
        assert_eq!(inspect.chunk_size, 1024);
        assert_eq!(inspect.input_file, Some(PathBuf::from("in")));
        assert_eq!(parse_opts(&["config"]).command, Command::Config);
    }

    #[test]
    fn summary_formats() {
        let s = WindowSummary {
            index: 3,
            stream_offset: 15,
            len: 5,
            target_len: 5,
            checksum: 0x0620_01e1,
            instructions: vec![Instruction::Add { offset: 0, len: 5 }],
        };
        let line = summary_line(&s);
        assert!(line.ends_with("062001e1  ADD 5 @payload+0"), "{line}");

        let json = summary_json(&s);
        assert_eq!(json["offset"], 15);
        assert_eq!(json["adler32"], "062001e1");
        assert_eq!(json["instructions"][0], "ADD 5 @payload+0");
    }

    #[test]
    fn fuzz_parser_tolerates_garbage() {
        fuzz_try_parse_args(&["decode".into(), "--capacity".into(), "zz".into()]);
        fuzz_try_parse_args(&["--json".into(), "inspect".into()]);
    }
}
