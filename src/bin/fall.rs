//! Fall CLI - Command-line interface for Synheart Fall
//!
//! Commands:
//! - detect: Run recorded samples through the detector (batch mode)
//! - run: Detect falls in samples streamed on stdin (streaming mode)
//! - validate: Validate sample input
//! - intensities: Print the threshold table

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_fall::logging::init_logging;
use synheart_fall::schema::SampleAdapter;
use synheart_fall::{
    AccelSample, DetectionError, DetectorConfig, FallDetector, FallEvent, Intensity, FALL_VERSION,
    FREE_FALL_THRESHOLD, PRODUCER_NAME,
};

/// Fall - On-device fall detection from accelerometer streams
#[derive(Parser)]
#[command(name = "fall")]
#[command(author = "Synheart AI Inc")]
#[command(version = FALL_VERSION)]
#[command(about = "Detect falls in accelerometer samples", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured intensity
    #[arg(long, global = true, value_enum)]
    intensity: Option<IntensityArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run recorded samples through the detector (batch mode)
    Detect {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Detect falls in samples streamed on stdin (streaming mode)
    Run {
        /// Flush output after each event
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Validate sample input
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the detection thresholds for each intensity
    Intensities {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IntensityArg {
    Low,
    Medium,
    High,
}

impl From<IntensityArg> for Intensity {
    fn from(arg: IntensityArg) -> Self {
        match arg {
            IntensityArg::Low => Intensity::Low,
            IntensityArg::Medium => Intensity::Medium,
            IntensityArg::High => Intensity::High,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON report with all events
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FallCliError> {
    let mut config = match &cli.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::default(),
    };
    if let Some(intensity) = cli.intensity {
        config.intensity = intensity.into();
    }
    init_logging(&config.logging);

    match cli.command {
        Commands::Detect {
            input,
            output,
            input_format,
            output_format,
        } => cmd_detect(&config, &input, &output, input_format, output_format),

        Commands::Run { flush } => cmd_run(&config, flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Intensities { json } => cmd_intensities(json),
    }
}

fn cmd_detect(
    config: &DetectorConfig,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
) -> Result<(), FallCliError> {
    let samples = read_samples(input, &input_format)?;
    if samples.is_empty() {
        return Err(FallCliError::NoSamples);
    }

    let mut detector = FallDetector::new(config.intensity);
    let mut events = Vec::new();
    let mut rejected = 0usize;

    for sample in &samples {
        match detector.process(sample) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                rejected += 1;
                tracing::warn!(timestamp_ms = sample.timestamp_ms, error = %e, "sample rejected");
            }
        }
    }

    tracing::info!(
        samples = samples.len(),
        rejected,
        falls = events.len(),
        "detection finished"
    );

    let report = DetectionReport {
        producer: PRODUCER_NAME.to_string(),
        version: FALL_VERSION.to_string(),
        intensity: config.intensity,
        samples: samples.len(),
        rejected_samples: rejected,
        events,
    };
    let output_data = format_output(&report, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(config: &DetectorConfig, flush: bool) -> Result<(), FallCliError> {
    if atty::is(atty::Stream::Stdin) {
        tracing::warn!("stdin is a terminal; pipe NDJSON samples into `fall run`");
    }

    let mut detector = FallDetector::new(config.intensity);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut previous: Option<AccelSample> = None;

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let Some(sample) = SampleAdapter::parse_line(&line).map_err(|e| {
            FallCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?
        else {
            continue;
        };

        if let Some(prev) = &previous {
            if let Err(e) = sample.validate_after(prev) {
                tracing::warn!(line = line_num + 1, error = %e, "out-of-order sample");
            }
        }
        previous = Some(sample);

        match detector.process(&sample) {
            Ok(Some(event)) => {
                tracing::info!("{}", event.summary());
                writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                if flush {
                    stdout.flush()?;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(line = line_num + 1, error = %e, "sample rejected"),
        }
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), FallCliError> {
    let samples = read_samples(input, &input_format)?;
    let results = SampleAdapter::validate_samples(&samples);

    let report = ValidationReport {
        total_samples: samples.len(),
        valid_samples: samples.len() - results.len(),
        invalid_samples: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                timestamp_ms: r.timestamp_ms,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Sample {} (t={} ms): {}",
                    err.index, err.timestamp_ms, err.error
                );
            }
        }
    }

    if report.invalid_samples > 0 {
        Err(FallCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

fn cmd_intensities(json: bool) -> Result<(), FallCliError> {
    if json {
        let table: Vec<serde_json::Value> = Intensity::ALL
            .iter()
            .map(|intensity| {
                let profile = intensity.profile();
                serde_json::json!({
                    "intensity": intensity,
                    "free_fall_below": FREE_FALL_THRESHOLD,
                    "landing_above": profile.landing_gravity,
                    "still_min": profile.min_still_gravity,
                    "still_max": profile.max_still_gravity,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!("Detection thresholds (gravity ratio, 1.0 = at rest)");
    println!();
    println!("Free fall onset: ratio < {FREE_FALL_THRESHOLD} (all intensities)");
    println!();
    println!("{:<8} {:>14} {:>16}", "tier", "landing above", "still band");
    for intensity in Intensity::ALL {
        let profile = intensity.profile();
        println!(
            "{:<8} {:>14.1} {:>16}",
            intensity.as_str(),
            profile.landing_gravity,
            format!("{:.1} - {:.1}", profile.min_still_gravity, profile.max_still_gravity)
        );
    }
    println!();
    println!("Landing must occur within 1 s of onset, stillness within 3 s.");
    Ok(())
}

// Helper functions

fn read_samples(input: &Path, format: &InputFormat) -> Result<Vec<AccelSample>, FallCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let samples = match format {
        InputFormat::Ndjson => SampleAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => SampleAdapter::parse_array(&input_data)?,
    };
    Ok(samples)
}

fn format_output(report: &DetectionReport, format: &OutputFormat) -> Result<String, FallCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for event in &report.events {
                output.push_str(&serde_json::to_string(event)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
    }
}

// Error types

#[derive(Debug)]
enum FallCliError {
    Io(io::Error),
    Detection(DetectionError),
    Json(serde_json::Error),
    NoSamples,
    ValidationFailed(usize),
    ParseError(String),
}

impl From<io::Error> for FallCliError {
    fn from(e: io::Error) -> Self {
        FallCliError::Io(e)
    }
}

impl From<DetectionError> for FallCliError {
    fn from(e: DetectionError) -> Self {
        FallCliError::Detection(e)
    }
}

impl From<serde_json::Error> for FallCliError {
    fn from(e: serde_json::Error) -> Self {
        FallCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FallCliError> for CliError {
    fn from(e: FallCliError) -> Self {
        match e {
            FallCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FallCliError::Detection(DetectionError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Check the --config file".to_string()),
            },
            FallCliError::Detection(e) => CliError {
                code: "DETECTION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input records are {timestamp_ms, x, y, z}".to_string()),
            },
            FallCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FallCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FallCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            FallCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DetectionReport {
    producer: String,
    version: String,
    intensity: Intensity,
    samples: usize,
    rejected_samples: usize,
    events: Vec<FallEvent>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp_ms: i64,
    error: String,
}
