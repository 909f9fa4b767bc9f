use clap::{Args, Parser, Subcommand, ValueEnum};
use rasterbuf::config::{self, RasterConfig};
use rasterbuf::gateway::{FormatGateway, ImageFormat, Operation, RustGateway, process_file};
use rasterbuf::image::{ColorDepth, Flip, Rotation};
use rasterbuf::scale::{AspectRatioMode, ScaleQuality};
use rasterbuf::{fingerprint, output};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "rasterbuf")]
#[command(about = "Resample, rotate, crop and convert images losslessly in 8 or 16 bits")]
#[command(long_about = "\
Resample, rotate, crop and convert images losslessly in 8 or 16 bits

Every transform command loads each input, applies the operation in memory
and writes the result to --output under the same file stem. Inputs are
processed in parallel.

Scaling uses area sampling: every source pixel under a destination pixel
contributes by the area it covers, in fixed-point integer arithmetic, for
both 8-bit and 16-bit images.

Run 'rasterbuf gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Output directory for transformed images
    #[arg(long, default_value = "out", global = true)]
    output: PathBuf,

    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Output format (jpeg, png, tiff, webp, avif); defaults to the input's
    #[arg(long, value_parser = parse_format, global = true)]
    format: Option<ImageFormat>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Input files shared by every image command.
#[derive(Args, Clone)]
struct Inputs {
    /// Image files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Angle {
    #[value(name = "90")]
    Quarter,
    #[value(name = "180")]
    Half,
    #[value(name = "270")]
    ThreeQuarter,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, ValueEnum)]
enum Bits {
    #[value(name = "8")]
    Eight,
    #[value(name = "16")]
    Sixteen,
}

#[derive(Clone, Copy, ValueEnum)]
enum Aspect {
    Ignore,
    Keep,
    KeepByExpanding,
}

#[derive(Subcommand)]
enum Command {
    /// Show size, depth, format and side-table of each image
    Info(Inputs),
    /// Scale images
    Resize {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        width: i64,
        #[arg(long)]
        height: i64,
        /// How the size relates to the aspect ratio (default from config)
        #[arg(long, value_enum)]
        aspect: Option<Aspect>,
        /// Nearest-neighbour sampling instead of area sampling
        #[arg(long)]
        fast: bool,
    },
    /// Rotate images clockwise
    Rotate {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, value_enum)]
        angle: Angle,
    },
    /// Mirror images
    Flip {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, value_enum)]
        direction: Direction,
    },
    /// Cut a rectangle out of images
    Crop {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, allow_negative_numbers = true)]
        x: i64,
        #[arg(long, allow_negative_numbers = true)]
        y: i64,
        #[arg(long)]
        width: i64,
        #[arg(long)]
        height: i64,
    },
    /// Convert images to 8 or 16 bits per channel
    Depth {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, value_enum)]
        bits: Bits,
    },
    /// Print content hashes of files, walking directories
    Hash {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Use the V1 hash (metadata + file head) instead of V2
        #[arg(long)]
        v1: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn parse_format(value: &str) -> Result<ImageFormat, String> {
    ImageFormat::from_extension(value).ok_or_else(|| format!("unknown image format '{value}'"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config_dir)?;
    init_thread_pool(&config.processing);
    let gateway = RustGateway::with_quality(config.output.encoder_quality());
    let format = cli.format.or(config.output.format);

    let (inputs, op) = match cli.command {
        Command::GenConfig => return Ok(()),
        Command::Info(inputs) => return info(&gateway, &inputs.inputs),
        Command::Hash { paths, v1 } => return hash(&gateway, &paths, v1),
        Command::Resize {
            inputs,
            width,
            height,
            aspect,
            fast,
        } => (
            inputs,
            Operation::Resize {
                width,
                height,
                aspect_ratio: aspect.map_or(config.scale.aspect_ratio, |a| match a {
                    Aspect::Ignore => AspectRatioMode::Ignore,
                    Aspect::Keep => AspectRatioMode::Keep,
                    Aspect::KeepByExpanding => AspectRatioMode::KeepByExpanding,
                }),
                quality: if fast {
                    ScaleQuality::Fast
                } else {
                    config.scale.quality
                },
            },
        ),
        Command::Rotate { inputs, angle } => (
            inputs,
            Operation::Rotate(match angle {
                Angle::Quarter => Rotation::Rot90,
                Angle::Half => Rotation::Rot180,
                Angle::ThreeQuarter => Rotation::Rot270,
            }),
        ),
        Command::Flip { inputs, direction } => (
            inputs,
            Operation::Flip(match direction {
                Direction::Horizontal => Flip::Horizontal,
                Direction::Vertical => Flip::Vertical,
            }),
        ),
        Command::Crop {
            inputs,
            x,
            y,
            width,
            height,
        } => (
            inputs,
            Operation::Crop {
                x,
                y,
                width,
                height,
            },
        ),
        Command::Depth { inputs, bits } => (
            inputs,
            Operation::Depth(match bits {
                Bits::Eight => ColorDepth::Eight,
                Bits::Sixteen => ColorDepth::Sixteen,
            }),
        ),
    };

    transform(&gateway, &config, &cli.output, &inputs.inputs, &op, format)
}

/// Install the tracing subscriber. `RUST_LOG` applies unless `-v` is given.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available cores; config can lower it, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn info(gateway: &RustGateway, inputs: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let results: Vec<_> = inputs.par_iter().map(|path| gateway.load(path)).collect();
    let mut failed = 0;
    for (i, (path, result)) in inputs.iter().zip(results).enumerate() {
        match result {
            Ok(image) => {
                for line in output::format_info(i + 1, path, &image) {
                    println!("{}", line);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }
    finish(inputs.len() - failed, inputs.len())
}

fn transform(
    gateway: &RustGateway,
    config: &RasterConfig,
    output_dir: &Path,
    inputs: &[PathBuf],
    op: &Operation,
    format: Option<ImageFormat>,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(output_dir)?;
    let ops = std::slice::from_ref(op);
    let results: Vec<_> = inputs
        .par_iter()
        .map(|source| {
            process_file(
                gateway,
                source,
                output_dir,
                ops,
                format,
                config.depth.dither_seed,
            )
        })
        .collect();

    let mut succeeded = 0;
    for (i, (source, result)) in inputs.iter().zip(&results).enumerate() {
        println!("{}", output::format_processed(i + 1, source, result));
        succeeded += usize::from(result.is_ok());
    }
    println!();
    println!("{}", output::format_summary(succeeded, inputs.len()));
    finish(succeeded, inputs.len())
}

fn hash(
    gateway: &RustGateway,
    paths: &[PathBuf],
    v1: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file()
                && (!v1 || ImageFormat::from_path(entry.path()).is_some())
            {
                files.push(entry.into_path());
            }
        }
    }

    let results: Vec<_> = files
        .par_iter()
        .map(|path| -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            if v1 {
                // V1 mixes in the encoded metadata, which needs a decode.
                Ok(gateway.load(path)?.unique_hash()?)
            } else {
                Ok(fingerprint::unique_hash_v2(path)?)
            }
        })
        .collect();

    let mut failed = 0;
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(hash) => println!("{}", output::format_hash(&hash, path)),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }
    finish(files.len() - failed, files.len())
}

fn finish(succeeded: usize, total: usize) -> Result<(), Box<dyn std::error::Error>> {
    if succeeded == total {
        Ok(())
    } else {
        Err(format!("{} of {} files failed", total - succeeded, total).into())
    }
}
