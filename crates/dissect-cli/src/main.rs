use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use dissect_core::protocols::{assoc, chain, options};
use dissect_core::{ByteCursor, ContextTable, DispatchRegistry, TreeReport};

/// Report schema version for the CLI envelope.
const REPORT_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(name = "dissect")]
#[command(version)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DISSECT_BUILD_COMMIT"),
    " ",
    env!("DISSECT_BUILD_DATE"),
    ")"
))]
#[command(
    about = "Offline decoder for captured protocol buffers.",
    long_about = None,
    after_help = "Examples:\n  dissect decode capture.bin -p chain -o report.json\n  dissect decode capture.hex -p options --hex --stdout\n  dissect decode -p assoc --session pdus/ --stdout --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode one buffer (or a session of buffers) into a JSON tree report.
    #[command(
        after_help = "Examples:\n  dissect decode capture.bin -p chain -o report.json\n  dissect decode -p assoc --session pdus/ --stdout"
    )]
    Decode {
        /// Path to a raw binary buffer (hex text with --hex)
        #[arg(required_unless_present = "session")]
        input: Option<PathBuf>,

        /// Protocol entry point
        #[arg(short = 'p', long, value_enum)]
        protocol: Protocol,

        /// Directory of PDU buffers, decoded in name order against one
        /// shared session
        #[arg(long, value_name = "DIR", conflicts_with = "input")]
        session: Option<PathBuf>,

        /// Treat inputs as hex text (whitespace and '#' comments ignored)
        #[arg(long)]
        hex: bool,

        /// Wire length the packet had before capture truncation
        #[arg(long, value_name = "LEN")]
        reported_len: Option<usize>,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write the JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,

        /// Exit with a non-zero code if any diagnostics are present
        #[arg(long)]
        strict: bool,

        /// List diagnostics after decoding
        #[arg(long)]
        list_diagnostics: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Protocol {
    /// Key-management payload chain
    Chain,
    /// Neighbor-discovery style option list
    Options,
    /// Association protocol with negotiated contexts
    Assoc,
}

impl Protocol {
    fn name(self) -> &'static str {
        match self {
            Protocol::Chain => "chain",
            Protocol::Options => "options",
            Protocol::Assoc => "assoc",
        }
    }

    fn registry(self) -> DispatchRegistry {
        match self {
            Protocol::Chain => chain::default_registry(),
            Protocol::Options => options::default_registry(),
            Protocol::Assoc => assoc::default_registry(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    report_version: u32,
    tool: ToolInfo,
    protocol: String,
    pdus: Vec<PduReport>,
}

#[derive(Debug, Serialize)]
struct ToolInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct PduReport {
    input: String,
    bytes: usize,
    tree: TreeReport,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode {
            input,
            protocol,
            session,
            hex,
            reported_len,
            report,
            stdout,
            pretty,
            compact,
            quiet,
            strict,
            list_diagnostics,
        } => cmd_decode(DecodeArgs {
            input,
            protocol,
            session,
            hex,
            reported_len,
            report,
            stdout,
            pretty,
            compact,
            quiet,
            strict,
            list_diagnostics,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

struct DecodeArgs {
    input: Option<PathBuf>,
    protocol: Protocol,
    session: Option<PathBuf>,
    hex: bool,
    reported_len: Option<usize>,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    compact: bool,
    quiet: bool,
    strict: bool,
    list_diagnostics: bool,
}

fn cmd_decode(args: DecodeArgs) -> Result<(), CliError> {
    let inputs = collect_inputs(&args)?;
    let registry = args.protocol.registry();
    let mut contexts = ContextTable::new();

    let mut pdus = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let data = load_buffer(path, args.hex)?;
        let cursor = match args.reported_len {
            Some(len) => ByteCursor::with_reported_len(&data, len),
            None => ByteCursor::new(&data),
        };
        let tree = match args.protocol {
            Protocol::Chain => chain::dissect(cursor, &registry),
            Protocol::Options => options::dissect(cursor, &registry),
            Protocol::Assoc => assoc::dissect(cursor, &registry, &mut contexts),
        };
        pdus.push(PduReport {
            input: path.display().to_string(),
            bytes: data.len(),
            tree: tree.export(),
        });
    }

    let report = Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "dissect".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        protocol: args.protocol.name().to_string(),
        pdus,
    };
    let json = serialize_report(&report, args.pretty, args.compact)?;

    if args.stdout {
        println!("{}", json);
    } else {
        let path = args
            .report
            .as_ref()
            .ok_or_else(|| {
                CliError::new(
                    "missing output path",
                    Some("use -o/--report or --stdout".to_string()),
                )
            })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
        }
        fs::write(path, &json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        if !args.quiet {
            eprintln!("OK: report written -> {}", path.display());
        }
    }

    if args.list_diagnostics && !args.quiet {
        print_diagnostics(&report);
    }
    if args.strict && has_diagnostics(&report) {
        return Err(CliError::new(
            "diagnostics present in decode",
            Some("use --list-diagnostics to inspect".to_string()),
        ));
    }
    Ok(())
}

fn collect_inputs(args: &DecodeArgs) -> Result<Vec<PathBuf>, CliError> {
    if let Some(dir) = &args.session {
        if !dir.is_dir() {
            return Err(CliError::new(
                format!("session path is not a directory: {}", dir.display()),
                Some("pass a directory of PDU buffers".to_string()),
            ));
        }
        let mut files = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read session directory: {}", dir.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("Failed to list directory: {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(CliError::new(
                format!("no files in session directory: {}", dir.display()),
                Some("PDU buffers are decoded in file name order".to_string()),
            ));
        }
        files.sort();
        return Ok(files);
    }

    let input = args
        .input
        .clone()
        .ok_or_else(|| CliError::new("missing input path", Some("pass a file or --session DIR".to_string())))?;
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("pass a captured buffer file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use --session for directories".to_string()),
        ));
    }
    Ok(vec![input])
}

fn load_buffer(path: &PathBuf, hex: bool) -> Result<Vec<u8>, CliError> {
    if hex {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        return parse_hex(&text);
    }
    fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))
        .map_err(Into::into)
}

fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let mut digits = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        digits.extend(line.chars().filter(|c| !c.is_whitespace()));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            "odd number of hex digits",
            Some("each byte needs two digits".to_string()),
        ));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(CliError::new(
                    format!("invalid hex digits '{}{}'", pair[0], pair[1]),
                    Some("only [0-9a-fA-F] and whitespace are allowed".to_string()),
                )),
            }
        })
        .collect()
}

fn serialize_report(report: &Report, pretty: bool, compact: bool) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn has_diagnostics(report: &Report) -> bool {
    report.pdus.iter().any(|pdu| !pdu.tree.diagnostics.is_empty())
}

fn print_diagnostics(report: &Report) {
    eprintln!("Diagnostics:");
    for pdu in &report.pdus {
        for diag in &pdu.tree.diagnostics {
            eprintln!(
                "  {} @{} {:?}: {}",
                pdu.input, diag.offset, diag.kind, diag.message
            );
        }
    }
}
