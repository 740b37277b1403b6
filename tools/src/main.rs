use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::Pattern;
use netarray::DeltaLimits;
use netarray_tools::{format_record_pretty, inspect_record, simulate, SimConfig};

#[derive(Parser)]
#[command(
    name = "netarray-tools",
    version,
    about = "netarray record inspection and simulation tools"
)]
struct Cli {
    /// JSON file overriding the decoder limits.
    #[arg(long, global = true)]
    limits: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect record headers.
    Inspect {
        /// A record file, or a directory of record files.
        record_path: PathBuf,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected records.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected records (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Replicate a deterministic session over a lossy link.
    Simulate {
        /// Number of ticks to simulate.
        #[arg(long, default_value_t = 300)]
        ticks: u32,
        /// RNG seed for deterministic results.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Percent chance that a record or acknowledgement is lost.
        #[arg(long, default_value_t = 10)]
        loss: u8,
        /// Maximum number of live items.
        #[arg(long, default_value_t = 64)]
        max_items: usize,
        /// Directory to write every record into.
        #[arg(long)]
        capture_dir: Option<PathBuf>,
        /// Write the JSON summary here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

struct RecordEntry {
    path: PathBuf,
    size: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let limits = cli
        .limits
        .as_deref()
        .map(load_limits)
        .transpose()
        .context("load limits")?
        .unwrap_or_default();

    match cli.command {
        Command::Inspect {
            record_path,
            glob,
            sort,
            limit,
            format,
        } => {
            if record_path.is_dir() {
                let entries = collect_record_entries(&record_path, glob.as_deref())?;
                let mut entries = maybe_sort_entries(entries, sort);
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    print_record(&entry.path, &limits, format)?;
                }
            } else {
                print_record(&record_path, &limits, format)?;
            }
        }
        Command::Simulate {
            ticks,
            seed,
            loss,
            max_items,
            capture_dir,
            out,
        } => {
            if loss > 100 {
                anyhow::bail!("--loss must be a percentage, got {loss}");
            }
            if let Some(dir) = &capture_dir {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create capture dir {}", dir.display()))?;
            }
            let config = SimConfig {
                ticks,
                seed,
                loss_percent: loss,
                max_items,
                limits,
            };
            let summary = simulate(&config, |tick, bytes| match &capture_dir {
                Some(dir) => {
                    let path = dir.join(format!("record_{tick:06}.bin"));
                    fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
                }
                None => Ok(()),
            })?;
            let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
            match out {
                Some(path) => fs::write(&path, contents)
                    .with_context(|| format!("write {}", path.display()))?,
                None => println!("{contents}"),
            }
        }
    }

    Ok(())
}

fn load_limits(path: &Path) -> Result<DeltaLimits> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read limits {}", path.display()))?;
    serde_json::from_str(&contents).context("parse limits JSON")
}

fn print_record(path: &Path, limits: &DeltaLimits, format: OutputFormat) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read record {}", path.display()))?;
    let report = inspect_record(&bytes, limits)
        .with_context(|| format!("inspect record {}", path.display()))?;
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serialize report")?
            );
        }
        OutputFormat::Pretty => print!("{}", format_record_pretty(&report)),
    }
    Ok(())
}

fn collect_record_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<RecordEntry>> {
    let pattern = glob
        .map(|value| Pattern::new(value).context("invalid glob pattern"))
        .transpose()?;

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !pattern.matches_path(&path) && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(RecordEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn maybe_sort_entries(
    mut entries: Vec<RecordEntry>,
    sort: Option<InspectSort>,
) -> Vec<RecordEntry> {
    if let Some(InspectSort::Size) = sort {
        entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    }
    entries
}
