use clap::Parser;
use pedtrack::{Config, HogDetector, Pipeline, RunSummary};
use serde::Serialize;
use std::{fs, path::PathBuf, process::ExitCode};
use tracing::error;

#[derive(Parser)]
#[command(
    name = "pedtrack",
    about = "Detect, track and speed-label pedestrians in a video",
    version
)]
struct Args {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Annotated output video (.mp4)
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the JSON summary here instead of stdout
    #[arg(short, long)]
    summary: Option<PathBuf>,

    /// Log filter, e.g. "info" or "pedtrack=debug"
    #[arg(long, default_value = "pedtrack=info")]
    log_level: String,
}

#[derive(Serialize)]
struct Response<'a> {
    message: &'a str,
    processed_video: String,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "startup failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let config = match &args.config {
        Some(path) => Config::from_file(&path.to_string_lossy())?,
        None => Config::default(),
    };
    let detector = HogDetector::new(config.detector.clone())?;
    let mut pipeline = Pipeline::new(detector, config);

    let summary = match pipeline.run(&args.input, &args.output) {
        Ok(summary) => summary,
        Err(e) => {
            let chain: Vec<String> = anyhow::Chain::new(&e).map(|c| c.to_string()).collect();
            error!(error = chain.join(": "), "processing failed");
            // 2 for bad input, 1 for unexpected faults
            return Ok(if e.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            });
        }
    };

    let response = Response {
        message: "Video processed successfully.",
        processed_video: args.output.display().to_string(),
        summary: &summary,
    };
    let json = serde_json::to_string_pretty(&response)?;
    match &args.summary {
        Some(path) => fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(ExitCode::SUCCESS)
}
