// Command line front end for pipezip.
//
// Explicit subcommands with long-form options. The codec format is taken
// from `--format`, then `PIPEZIP_FORMAT`, then the JSON config file, and
// finally falls back to gzip.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::client::{Client, Direction};
use crate::codec::{self, Config};
use crate::error::ConfigError;
use crate::io::{self as transfer_io, TransferError, TransferStats};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG_PATH: &str = "pipezip.json";
const FORMAT_ENV: &str = "PIPEZIP_FORMAT";

// ---------------------------------------------------------------------------
// Duration parsing (seconds, fractional allowed)
// ---------------------------------------------------------------------------

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid timeout '{s}': {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout '{s}': {e}"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Streaming compressor/decompressor.
#[derive(Parser, Debug)]
#[command(
    name = "pipezip",
    version,
    about = "Streaming compressor/decompressor",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compress the input stream to stdout.
    Compress(TransformArgs),
    /// Decompress the input stream to stdout.
    Decompress(TransformArgs),
    /// List the built-in formats.
    Formats,
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Compression format (gzip, zlib, noop).
    #[arg(long, short = 'f', env = FORMAT_ENV)]
    format: Option<String>,

    /// JSON config file; used only when no format is given otherwise.
    #[arg(long, value_hint = ValueHint::FilePath, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Input file (default: stdin).
    #[arg(long, short = 'i', value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Give up after this many seconds.
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Transform(Direction),
    Formats,
}

#[derive(Debug)]
struct Options {
    command: Command,
    format: Option<String>,
    config_path: PathBuf,
    input_file: Option<PathBuf>,
    timeout: Option<Duration>,
    verbose: u8,
    quiet: bool,
    json_output: bool,
}

fn resolve_options(cli: Cli) -> Options {
    let verbose = cli.verbose.min(2);
    let (command, args) = match cli.command {
        Cmd::Compress(args) => (Command::Transform(Direction::Compress), Some(args)),
        Cmd::Decompress(args) => (Command::Transform(Direction::Decompress), Some(args)),
        Cmd::Formats => (Command::Formats, None),
    };
    let (format, config_path, input_file, timeout) = match args {
        Some(args) => (args.format, args.config, args.input, args.timeout),
        None => (None, PathBuf::from(DEFAULT_CONFIG_PATH), None, None),
    };
    Options {
        command,
        format,
        config_path,
        input_file,
        timeout,
        verbose,
        quiet: cli.quiet,
        json_output: cli.json_output,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("pipezip".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("reading config file {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("parsing config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("creating client: {0}")]
    Client(#[from] ConfigError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Settings read from the JSON config file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct FileConfig {
    format: Option<String>,
}

/// A missing or empty file yields no settings.
fn load_file_config(path: &Path) -> Result<FileConfig, CliError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("no config file at {}", path.display());
            return Ok(FileConfig::default());
        }
        Err(source) => {
            return Err(CliError::ConfigRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_json::from_str(&text).map_err(|source| CliError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// `--format` (or its env var) wins; the config file is read only when
/// neither is set. An empty result selects the default format.
fn resolve_format(opts: &Options) -> Result<String, CliError> {
    if let Some(format) = &opts.format {
        return Ok(format.clone());
    }
    let file = load_file_config(&opts.config_path)?;
    if let Some(format) = &file.format {
        log::debug!("format {format:?} from {}", opts.config_path.display());
    }
    Ok(file.format.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Parse `args` and run the selected command.
///
/// Transformed data goes to `output`, diagnostics and stats to stderr. The
/// first element of `args` is the program name.
pub fn run_with<I, T, R>(
    args: I,
    input: R,
    output: &mut dyn Write,
    token: &CancellationToken,
) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    R: Read + Send + 'static,
{
    let cli = Cli::try_parse_from(args)?;
    execute(&resolve_options(cli), input, output, token)
}

fn execute<R>(
    opts: &Options,
    input: R,
    output: &mut dyn Write,
    token: &CancellationToken,
) -> Result<(), CliError>
where
    R: Read + Send + 'static,
{
    match opts.command {
        Command::Formats => cmd_formats(output),
        Command::Transform(direction) => cmd_transform(opts, direction, input, output, token),
    }
}

fn cmd_formats(output: &mut dyn Write) -> Result<(), CliError> {
    for name in codec::available_formats() {
        writeln!(output, "{name}")?;
    }
    output.flush()?;
    Ok(())
}

fn cmd_transform<R>(
    opts: &Options,
    direction: Direction,
    input: R,
    output: &mut dyn Write,
    token: &CancellationToken,
) -> Result<(), CliError>
where
    R: Read + Send + 'static,
{
    let client = Client::new(Config::with_format(resolve_format(opts)?))?;

    let input: Box<dyn Read + Send> = match &opts.input_file {
        Some(path) => Box::new(transfer_io::open(path)?),
        None => Box::new(input),
    };

    let token = match opts.timeout {
        Some(timeout) => token.with_timeout(timeout),
        None => token.child(),
    };

    let stats = transfer_io::transfer(&client, &token, direction, input, output)?;
    report(opts, client.format(), &stats)?;
    Ok(())
}

#[derive(Serialize)]
struct StatsReport<'a> {
    command: &'a str,
    format: &'a str,
    input_size: u64,
    output_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_sha256: Option<String>,
}

fn report(opts: &Options, format: &str, stats: &TransferStats) -> Result<(), CliError> {
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "pipezip: {} ({format}): input size: {}, output size: {}",
            stats.direction.name(),
            stats.input_size,
            stats.output_size
        );
    }

    if opts.json_output {
        let report = StatsReport {
            command: stats.direction.name(),
            format,
            input_size: stats.input_size,
            output_size: stats.output_size,
            ratio: stats.ratio(),
            output_sha256: stats.output_sha256_hex(),
        };
        let json = serde_json::to_string_pretty(&report).map_err(io::Error::from)?;
        eprintln!("{json}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

pub fn run() -> ! {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };
    init_logging(cli.verbose, cli.quiet);
    let opts = resolve_options(cli);

    let token = CancellationToken::new();
    let mut stdout = BufWriter::new(io::stdout().lock());

    let exit_code = match execute(&opts, io::stdin(), &mut stdout, &token) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("pipezip: {e}");
            1
        }
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("pipezip".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    fn run_args(args: &[&str], input: Vec<u8>) -> Result<Vec<u8>, CliError> {
        let argv = std::iter::once("pipezip").chain(args.iter().copied());
        let mut out = Vec::new();
        run_with(argv, Cursor::new(input), &mut out, &CancellationToken::new())?;
        Ok(out)
    }

    #[test]
    fn parse_timeout_accepts_fractions() {
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_timeout("0.25").unwrap(), Duration::from_millis(250));
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn compress_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "compress",
            "--format",
            "zlib",
            "--input",
            "in.bin",
            "--config",
            "custom.json",
            "--timeout",
            "3",
        ]);
        assert_eq!(opts.command, Command::Transform(Direction::Compress));
        assert_eq!(opts.format.as_deref(), Some("zlib"));
        assert_eq!(opts.input_file, Some(PathBuf::from("in.bin")));
        assert_eq!(opts.config_path, PathBuf::from("custom.json"));
        assert_eq!(opts.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn decompress_defaults() {
        let opts = parse_opts(&["-q", "decompress"]);
        assert_eq!(opts.command, Command::Transform(Direction::Decompress));
        assert_eq!(opts.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(opts.input_file, None);
        assert_eq!(opts.timeout, None);
        assert!(opts.quiet);
    }

    #[test]
    fn verbose_is_capped() {
        let opts = parse_opts(&["-v", "-v", "-v", "--json", "formats"]);
        assert_eq!(opts.verbose, 2);
        assert!(opts.json_output);
        assert_eq!(opts.command, Command::Formats);
    }

    #[test]
    fn unknown_action_is_a_usage_error() {
        let err = run_args(&["explode"], Vec::new()).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn formats_lists_builtins() {
        let out = run_args(&["formats"], Vec::new()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "gzip\nzlib\nnoop\n");
    }

    #[test]
    fn roundtrip_through_run_with() {
        let data = b"streamed through the command line ".repeat(64);
        let packed = run_args(&["compress", "--format", "zlib"], data.clone()).unwrap();
        assert_ne!(packed, data);
        let restored = run_args(&["decompress", "--format", "zlib"], packed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn unknown_format_names_the_format() {
        let err = run_args(&["compress", "--format", "badFormat"], b"x".to_vec()).unwrap_err();
        assert!(matches!(err, CliError::Client(ConfigError::UnknownFormat(_))));
        assert!(err.to_string().contains("badFormat"));
    }

    #[test]
    fn config_file_supplies_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipezip.json");
        fs::write(&path, r#"{"format": "noop"}"#).unwrap();

        let opts = Options {
            format: None,
            config_path: path.clone(),
            ..parse_opts(&["compress"])
        };
        assert_eq!(resolve_format(&opts).unwrap(), "noop");

        let opts = Options {
            format: Some("zlib".into()),
            config_path: path,
            ..parse_opts(&["compress"])
        };
        assert_eq!(resolve_format(&opts).unwrap(), "zlib");
    }

    #[test]
    fn config_file_edge_cases() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert_eq!(load_file_config(&missing).unwrap(), FileConfig::default());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert_eq!(load_file_config(&empty).unwrap(), FileConfig::default());

        let other_keys = dir.path().join("other.json");
        fs::write(&other_keys, r#"{"level": 9}"#).unwrap();
        assert_eq!(load_file_config(&other_keys).unwrap().format, None);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{format: gzip").unwrap();
        assert!(matches!(
            load_file_config(&broken),
            Err(CliError::ConfigParse { .. })
        ));

        // A directory cannot be read as a file.
        assert!(matches!(
            load_file_config(dir.path()),
            Err(CliError::ConfigRead { .. })
        ));
    }

    #[test]
    fn input_file_overrides_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, b"from the file").unwrap();
        let path = path.to_string_lossy().into_owned();

        let out = run_args(
            &["compress", "--format", "noop", "--input", &path],
            b"from stdin".to_vec(),
        )
        .unwrap();
        assert_eq!(out, b"from the file");
    }

    #[test]
    fn missing_input_file_fails() {
        let err = run_args(
            &["compress", "--input", "/definitely/not/here.bin"],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Transfer(TransferError::Open { .. })
        ));
    }

    #[test]
    fn cli_parse_fuzz_helper_tolerates_garbage() {
        fuzz_try_parse_args(&["--timeout".into(), "compress".into()]);
        fuzz_try_parse_args(&["decompress".into(), "--format".into()]);
    }
}
