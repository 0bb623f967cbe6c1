//! trainkit binary entry point
//!
//! Command-line access to checkpoint simplification and inspection,
//! verification-bin extraction and raw feature files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::NdFloat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use features::{
    read_features, read_features_verbose, write_features, Dtype, FeatureElement, InstanceCount,
};
use runtime_core::ToolkitConfig;

#[derive(Parser)]
#[command(name = "trainkit")]
#[command(version, about = "Checkpoint and feature-file utilities for training runs", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strip a checkpoint down to its weights
    Simplify {
        /// Checkpoint to simplify
        path: PathBuf,

        /// Output path (default: <path>_simplified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Parameter to drop (repeatable)
        #[arg(long = "ignore")]
        ignores: Vec<String>,
    },

    /// Print a checkpoint summary
    Inspect {
        /// Checkpoint file or best link
        path: PathBuf,
    },

    /// Decode a verification bin and write its images as JPEG
    ExtractBin {
        /// Pickled (images, labels) file
        bin: PathBuf,

        /// Destination folder
        folder: PathBuf,
    },

    /// Print the shape and mean row norm of a feature file
    FeatInfo {
        /// Raw feature file
        path: PathBuf,

        /// Feature dimension
        #[arg(long)]
        dim: usize,

        /// Number of rows, -1 for the whole file
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        count: i64,

        /// Element type (f32, f64); defaults to the configured dtype
        #[arg(long)]
        dtype: Option<Dtype>,
    },

    /// L2-normalize every row of a feature file
    Normalize {
        /// Raw feature file
        input: PathBuf,

        /// Where to write the normalized features
        output: PathBuf,

        /// Feature dimension
        #[arg(long)]
        dim: usize,

        /// Element type (f32, f64); defaults to the configured dtype
        #[arg(long)]
        dtype: Option<Dtype>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trainkit=info,checkpoint=info,features=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ToolkitConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ToolkitConfig::default(),
    };
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Simplify {
            path,
            output,
            ignores,
        } => {
            let written = checkpoint::simplify_checkpoint(&path, output.as_deref(), &ignores)?;
            println!("Simplified checkpoint written to {}", written.display());
        }
        Commands::Inspect { path } => {
            let summary = checkpoint::inspect_checkpoint(&path)?;
            println!("{}", summary);
        }
        Commands::ExtractBin { bin, folder } => {
            let set = features::decode_verification_bin(&bin)?;
            let written = features::write_images(&set.images, &folder)?;
            println!(
                "Wrote {} images ({} pairs) to {}",
                written,
                set.num_pairs(),
                folder.display()
            );
        }
        Commands::FeatInfo {
            path,
            dim,
            count,
            dtype,
        } => {
            let count = InstanceCount::from_raw(count)?;
            match dtype.unwrap_or(config.features.dtype) {
                Dtype::F32 => feat_info::<f32>(&path, count, dim, config.features.verbose)?,
                Dtype::F64 => feat_info::<f64>(&path, count, dim, config.features.verbose)?,
            }
        }
        Commands::Normalize {
            input,
            output,
            dim,
            dtype,
        } => {
            let rows = match dtype.unwrap_or(config.features.dtype) {
                Dtype::F32 => normalize_file::<f32>(&input, &output, dim)?,
                Dtype::F64 => normalize_file::<f64>(&input, &output, dim)?,
            };
            println!("Normalized {} rows into {}", rows, output.display());
        }
    }

    Ok(())
}

fn feat_info<T>(path: &Path, count: InstanceCount, dim: usize, verbose: bool) -> Result<()>
where
    T: FeatureElement + NdFloat,
{
    let matrix = read_features_verbose::<T, _>(path, count, dim, verbose)
        .with_context(|| format!("reading {}", path.display()))?
        .into_matrix();
    let (rows, cols) = matrix.dim();

    let mean_norm = if rows == 0 {
        0.0
    } else {
        matrix
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|&v| FeatureElement::to_f64(v).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .sum::<f64>()
            / rows as f64
    };

    println!("shape: {} x {} ({})", rows, cols, T::DTYPE);
    println!("mean row norm: {:.6}", mean_norm);
    if verbose {
        for (i, row) in matrix.rows().into_iter().enumerate().take(5) {
            println!("row {}: {:?}", i, row.to_vec());
        }
    }
    Ok(())
}

fn normalize_file<T>(input: &Path, output: &Path, dim: usize) -> Result<usize>
where
    T: FeatureElement + NdFloat,
{
    let matrix = read_features::<T, _>(input, InstanceCount::All, dim)
        .with_context(|| format!("reading {}", input.display()))?
        .into_matrix();
    let normalized = train_metrics::normalize(&matrix, 1)?;
    let bytes = write_features(output, &normalized)?;
    tracing::info!(path = %output.display(), rows = normalized.nrows(), bytes, "Wrote normalized features");
    Ok(normalized.nrows())
}
