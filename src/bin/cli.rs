//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `inspect`, `split`, and `export`.
//!
//! Examples:
//! ```bash
//! ag-cli inspect  ./fruit_classification --task classification
//! ag-cli inspect  ./apple_detection --task detection --batch-size 4 --state torch
//! ag-cli split    ./fruit_classification --task classification --train 0.8 --val 0.1 --test 0.1
//! ag-cli export   ./leaf_segmentation --task segmentation --index 0 --out leaf0.npy
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use ndarray::ArrayD;
use ndarray_npy::write_npy;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agloader::{
    Annotation, BatchAnnotations, DataManager, ImageSize, Loaded, LoaderOptions, SplitSpec, Stacked,
    StateRequest, Task,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

// -- Commands

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

/// Options shared by every subcommand: where the dataset is and how to load it.
#[derive(Args)]
struct DatasetArgs {
    /// Dataset root in one of the canonical layouts.
    root: PathBuf,

    /// Dataset task.
    #[arg(short, long, value_enum)]
    task: Task,

    /// Group samples into batches of this size.
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Resize policy: `default`, `auto` or `HxW`.
    #[arg(long, default_value = "default")]
    image_size: ImageSize,

    /// Training state: `none`, `disabled`, `eval`, `tf` or `torch`.
    #[arg(long, default_value = "none")]
    state: StateRequest,

    /// Seed for the initial shuffle.
    #[arg(long)]
    seed: Option<u64>,

    /// Keep storage order instead of shuffling.
    #[arg(long)]
    no_shuffle: bool,
}

impl DatasetArgs {
    fn open(&self) -> Result<DataManager> {
        let mut opts = LoaderOptions::from_env()?
            .with_image_size(self.image_size);
        if self.no_shuffle {
            opts = opts.shuffle(false, None);
        } else if self.seed.is_some() {
            opts = opts.shuffle(true, self.seed);
        }
        if let Some(n) = self.batch_size {
            opts = opts.with_batch_size(n);
        }

        let mut dm = DataManager::from_layout(&self.root, self.task, opts)
            .with_context(|| format!("failed to load dataset at {}", self.root.display()))?;
        dm.update_train_state(self.state)?;
        Ok(dm)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print a dataset summary and the shape of one item.
    Inspect {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Logical index of the item to load.
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },
    /// Print the sizes of a train/val/test split.
    Split {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[arg(long, default_value_t = 0.8)]
        train: f64,

        #[arg(long, default_value_t = 0.1)]
        val: f64,

        #[arg(long, default_value_t = 0.1)]
        test: f64,

        /// Seed for drawing split members; unshuffled when omitted.
        #[arg(long)]
        split_seed: Option<u64>,
    },
    /// Write the image array of one item to a `.npy` file.
    Export {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[arg(short, long, default_value_t = 0)]
        index: usize,

        /// Output file.
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Capture `log` records from dependencies.
    tracing_log::LogTracer::init().ok();

    match cli.cmd {
        Command::Inspect { dataset, index } => {
            let dm = dataset.open()?;
            print_summary(&dm)?;
            let item = dm.get(index)?;
            safe_println!("item {}: {}", index, describe(&item));
        }

        Command::Split { dataset, train, val, test, split_seed } => {
            let dm = dataset.open()?;
            let mut spec = SplitSpec::train_val_test(train, val, test);
            if split_seed.is_some() {
                spec = spec.shuffled(split_seed);
            }
            let parts = dm.split(&spec)?;
            safe_println!("{}: {} samples", dm.name(), dm.num_samples());
            for (name, part) in &parts {
                safe_println!("  {:<6} {:>6} samples  {:>6} items", name, part.num_samples(), part.len());
            }
        }

        Command::Export { dataset, index, out } => {
            let dm = dataset.open()?;
            let image = match dm.get(index)? {
                Loaded::Sample(sample) => sample.image,
                Loaded::Batch(batch) => match batch.images {
                    Stacked::Uniform(images) => images,
                    Stacked::Heterogeneous(_) => {
                        bail!("batch {index} has images of differing shapes; set --image-size")
                    }
                },
            };
            write_image(&out, &image)?;
            info!("Wrote {:?} array to {}", image.shape(), out.display());
            safe_println!("wrote {:?} to {}", image.shape(), out.display());
        }
    }

    Ok(())
}

fn write_image(path: &Path, image: &ArrayD<f32>) -> Result<()> {
    write_npy(path, image).with_context(|| format!("failed to write {}", path.display()))
}

fn print_summary(dm: &DataManager) -> Result<()> {
    safe_println!("dataset   {}", dm.name());
    safe_println!("task      {}", dm.task());
    safe_println!("root      {}", dm.root().display());
    safe_println!("samples   {}", dm.num_samples());
    safe_println!("items     {}", dm.len());
    safe_println!("batch     {:?}", dm.batch_size());
    safe_println!("state     {}", dm.train_state());
    if dm.num_classes() > 0 {
        safe_println!("classes   {}", dm.class_names().join(", "));
    }
    Ok(())
}

fn shape_of<A>(stacked: &Stacked<A>) -> String {
    match stacked {
        Stacked::Uniform(a) => format!("{:?}", a.shape()),
        Stacked::Heterogeneous(items) => {
            let shapes: Vec<_> = items.iter().map(|a| format!("{:?}", a.shape())).collect();
            format!("[{}]", shapes.join(", "))
        }
    }
}

fn describe(item: &Loaded) -> String {
    match item {
        Loaded::Sample(s) => format!(
            "image {:?}, annotation {}",
            s.image.shape(),
            match &s.annotation {
                Annotation::Label(l) => format!("label {l}"),
                Annotation::Coco(r) => format!("{} boxes", r.len()),
                Annotation::Mask(m) => format!("mask {:?}", m.dim()),
            }
        ),
        Loaded::Batch(b) => {
            let annotations = match &b.annotations {
                BatchAnnotations::Labels(l) => format!("labels {l}"),
                BatchAnnotations::Coco(records) => {
                    let counts: Vec<_> = records.iter().map(|r| r.len().to_string()).collect();
                    format!("box counts [{}]", counts.join(", "))
                }
                BatchAnnotations::Masks(m) => format!("masks {}", shape_of(m)),
            };
            format!("batch of {}, images {}, {}", b.len(), shape_of(&b.images), annotations)
        }
    }
}
