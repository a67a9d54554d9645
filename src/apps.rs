use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{ProduceConfig, SplitConfig};
use crate::constants::manifest::DEFAULT_MANIFEST_FILENAME;
use crate::constants::produce::{DEFAULT_MAX_LEN, DEFAULT_STEP_SIZE};
use crate::constants::store::STORE_EXTENSION;
use crate::embedding::VectorTable;
use crate::features::{EmbeddingFeatures, FeatureGenerator, LiwcFeatures};
use crate::input::{CsvOptions, read_rows_csv};
use crate::manifest::{StoreLabels, StoreManifest, StoreRecord};
use crate::padding::PadPosition;
use crate::splits::{ALL_SPLITS, SplitLabel, slice_long_texts, stratified_split};
use crate::store::{ColumnValues, FeatureStoreReader, produce_store, rebuild_excluding};
use crate::types::RowIdx;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FeatureArg {
    /// Padded word-embedding sequences.
    Embedding,
    /// LIWC score vectors taken from the numeric input columns.
    Liwc,
}

#[derive(Debug, Parser)]
#[command(
    name = "build_store",
    disable_help_subcommand = true,
    about = "Build split feature stores from a labeled text table",
    long_about = "Read a date/text/name/label table, split it into train/val/test, and write one feature store per split.",
    after_help = "Stores are written as <corpus>_<split>_<feature-kind>.fstore and catalogued in stores.json under the output directory."
)]
struct BuildStoreCli {
    #[arg(long, value_name = "PATH", help = "Delimited input table")]
    input: PathBuf,
    #[arg(long = "output-dir", value_name = "DIR", help = "Directory receiving the stores")]
    output_dir: PathBuf,
    #[arg(long, value_enum, default_value = "embedding", help = "Feature representation")]
    features: FeatureArg,
    #[arg(
        long,
        value_name = "PATH",
        required_if_eq("features", "embedding"),
        help = "GloVe/fastText text-format vector file"
    )]
    vectors: Option<PathBuf>,
    #[arg(long, help = "Corpus name recorded in the manifest (defaults to the input file stem)")]
    corpus: Option<String>,
    #[arg(
        long = "feature-kind",
        help = "Feature backend name recorded in the manifest (defaults to the vector file stem or 'liwc')"
    )]
    feature_kind: Option<String>,
    #[arg(
        long = "max-len",
        default_value_t = DEFAULT_MAX_LEN,
        value_parser = parse_positive_usize,
        help = "Padded sequence width"
    )]
    max_len: usize,
    #[arg(long = "pad-position", default_value = "tail", help = "head, tail, or split")]
    pad_position: PadPosition,
    #[arg(
        long = "step-size",
        default_value_t = DEFAULT_STEP_SIZE,
        value_parser = parse_positive_usize,
        help = "Rows processed and persisted per batch"
    )]
    step_size: usize,
    #[arg(long, default_value = ",", value_parser = parse_delimiter, help = "Single-byte field delimiter")]
    delimiter: u8,
    #[arg(long = "slice-long-texts", help = "Cut texts longer than --max-len tokens into windows first")]
    slice_long_texts: bool,
    #[arg(long, default_value_t = 42, help = "Deterministic seed used for the split shuffle")]
    seed: u64,
}

#[derive(Debug, Parser)]
#[command(
    name = "inspect_store",
    disable_help_subcommand = true,
    about = "Describe a feature store or a directory of stores",
    long_about = "Print schema, row count, chunk layout and labels of a store, verify column consistency, and optionally preview a column."
)]
struct InspectStoreCli {
    #[arg(value_name = "PATH", help = "Store file, or a directory to scan")]
    path: PathBuf,
    #[arg(long, help = "Column to preview")]
    column: Option<String>,
    #[arg(long, default_value_t = 0, help = "First row of the preview")]
    start: u64,
    #[arg(long, default_value_t = 5, help = "Rows in the preview")]
    count: u64,
    #[arg(long = "write-manifest", help = "When scanning a directory, save stores.json into it")]
    write_manifest: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "rebuild_store",
    disable_help_subcommand = true,
    about = "Copy a feature store without selected rows",
    long_about = "Stream a store into a new sealed store, leaving out every row whose idx is listed."
)]
struct RebuildStoreCli {
    #[arg(long, value_name = "PATH", help = "Store to copy")]
    source: PathBuf,
    #[arg(long, value_name = "PATH", help = "New store path")]
    destination: PathBuf,
    #[arg(
        long,
        value_name = "IDX,...",
        value_delimiter = ',',
        help = "Comma-separated idx values to drop"
    )]
    exclude: Vec<RowIdx>,
    #[arg(
        long = "exclude-file",
        value_name = "PATH",
        help = "File with one idx per line to drop"
    )]
    exclude_file: Option<PathBuf>,
    #[arg(
        long = "step-size",
        default_value_t = DEFAULT_STEP_SIZE,
        value_parser = parse_positive_usize,
        help = "Rows copied per batch"
    )]
    step_size: usize,
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run_build_store<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<BuildStoreCli, _>(std::iter::once("build_store".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let options = CsvOptions {
        delimiter: cli.delimiter,
        ..CsvOptions::default()
    };
    let mut rows = read_rows_csv(&cli.input, &options)?;
    let split_config = SplitConfig {
        seed: cli.seed,
        slice_len: cli.max_len,
        ..SplitConfig::default()
    };
    if cli.slice_long_texts {
        let before = rows.len();
        rows = slice_long_texts(&rows, split_config.slice_len, split_config.slice_drop_threshold);
        println!("sliced {before} rows into {}", rows.len());
    }
    let splits = stratified_split(&rows, &split_config)?;

    let corpus = match cli.corpus {
        Some(corpus) => corpus,
        None => file_stem(&cli.input)?,
    };
    let (generator, feature_kind): (Box<dyn FeatureGenerator>, String) = match cli.features {
        FeatureArg::Embedding => {
            let vectors = cli
                .vectors
                .as_deref()
                .ok_or("--vectors is required for embedding stores")?;
            let table = VectorTable::load_text(vectors)?;
            let kind = match cli.feature_kind {
                Some(kind) => kind,
                None => file_stem(vectors)?,
            };
            let generator: Box<dyn FeatureGenerator> = Box::new(EmbeddingFeatures::new(
                Arc::new(table),
                cli.max_len,
                cli.pad_position,
            ));
            (generator, kind)
        }
        FeatureArg::Liwc => {
            let dim = rows.first().map(|row| row.scores.len()).unwrap_or(0);
            if dim == 0 {
                return Err("liwc stores need numeric score columns in the input table".into());
            }
            let kind = cli.feature_kind.unwrap_or_else(|| "liwc".to_string());
            let generator: Box<dyn FeatureGenerator> = Box::new(LiwcFeatures::new(dim));
            (generator, kind)
        }
    };
    let schema = generator.schema()?;

    fs::create_dir_all(&cli.output_dir)?;
    let manifest_path = cli.output_dir.join(DEFAULT_MANIFEST_FILENAME);
    let mut manifest = if manifest_path.is_file() {
        StoreManifest::load(&manifest_path)?
    } else {
        StoreManifest::default()
    };

    for split in ALL_SPLITS {
        let split_rows = splits.get(split);
        let path = cli
            .output_dir
            .join(format!("{corpus}_{split}_{feature_kind}.{STORE_EXTENSION}"));
        let config = ProduceConfig {
            step_size: cli.step_size,
            labels: StoreLabels {
                split: Some(split),
                corpus: Some(corpus.clone()),
                feature_kind: Some(feature_kind.clone()),
            },
            ..ProduceConfig::default()
        };
        let summary = produce_store(split_rows, generator.as_ref(), &path, schema, &config)?;
        println!(
            "{split:<5} {:>7} rows ({} skipped, {} chunks) -> {}",
            summary.rows,
            summary.skipped,
            summary.chunks,
            path.display()
        );
        if summary.created {
            let reader = FeatureStoreReader::open(&path)?;
            manifest.register(StoreRecord::from_reader(&reader));
        }
    }
    manifest.save(&manifest_path)?;
    println!("manifest: {}", manifest_path.display());
    Ok(())
}

pub fn run_inspect_store<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<InspectStoreCli, _>(
        std::iter::once("inspect_store".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    if cli.path.is_dir() {
        let manifest = StoreManifest::scan(&cli.path)?;
        for record in &manifest.stores {
            print_record(record);
        }
        if cli.write_manifest {
            let manifest_path = cli.path.join(DEFAULT_MANIFEST_FILENAME);
            manifest.save(&manifest_path)?;
            println!("manifest: {}", manifest_path.display());
        }
        return Ok(());
    }

    let reader = FeatureStoreReader::open(&cli.path)?;
    print_record(&StoreRecord::from_reader(&reader));
    println!("schema: {}", reader.schema());
    println!(
        "columns: {}",
        reader
            .schema()
            .columns()
            .into_iter()
            .map(|column| reader.schema().column_name(column))
            .collect::<Vec<_>>()
            .join(", ")
    );
    for (chunk_no, span) in reader.chunk_spans().iter().enumerate() {
        println!("chunk {chunk_no}: rows [{}, {})", span.start, span.end());
    }
    let rows = reader.assert_consistent_lengths()?;
    println!("consistent: {rows} rows in every column");

    if let Some(name) = cli.column.as_deref() {
        let column = reader.schema().parse_column(name)?;
        let values = reader.read_column(column, Some(cli.start), Some(cli.count))?;
        println!("{name} [{}, +{}):", cli.start, values.len());
        match values {
            ColumnValues::Ints(values) => println!("  {values:?}"),
            ColumnValues::Strings(values) => println!("  {values:?}"),
            ColumnValues::Features(block) => {
                for row in block.rows() {
                    let head: Vec<f32> = row.iter().take(8).copied().collect();
                    println!("  {head:?}{}", if row.len() > 8 { " ..." } else { "" });
                }
            }
        }
    }
    Ok(())
}

pub fn run_rebuild_store<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<RebuildStoreCli, _>(
        std::iter::once("rebuild_store".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut exclude = cli.exclude;
    if let Some(path) = cli.exclude_file.as_deref() {
        exclude.extend(read_id_file(path)?);
    }
    let report = rebuild_excluding(&cli.source, &cli.destination, &exclude, cli.step_size)?;
    println!(
        "{} -> {}: {} of {} rows kept, {} removed",
        report.source.display(),
        report.destination.display(),
        report.rows_written,
        report.rows_read,
        report.removed.len()
    );
    if !report.not_found.is_empty() {
        println!("ids not present in source: {:?}", report.not_found);
    }
    Ok(())
}

fn print_record(record: &StoreRecord) {
    let label = |value: Option<&str>| value.unwrap_or("-").to_string();
    println!(
        "{} | split={} corpus={} features={} dim={} max_len={} pad={} rows={} sealed={}",
        record.path.display(),
        label(record.split.as_ref().map(SplitLabel::as_str)),
        label(record.corpus.as_deref()),
        label(record.feature_kind.as_deref()),
        record.dim,
        record
            .max_len
            .map_or_else(|| "-".to_string(), |max_len| max_len.to_string()),
        label(record.pad_position.as_ref().map(PadPosition::as_str)),
        record.rows,
        record.sealed
    );
}

fn read_id_file(path: &Path) -> Result<Vec<RowIdx>, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let mut ids = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line.parse::<RowIdx>().map_err(|_| {
            format!(
                "{}:{}: '{line}' is not a row idx",
                path.display(),
                line_no + 1
            )
        })?;
        ids.push(id);
    }
    Ok(ids)
}

fn file_stem(path: &Path) -> Result<String, Box<dyn Error>> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("cannot derive a name from {}", path.display()).into())
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_delimiter(raw: &str) -> Result<u8, String> {
    match raw {
        "\\t" | "tab" => Ok(b'\t'),
        _ if raw.len() == 1 => Ok(raw.as_bytes()[0]),
        _ => Err(format!("delimiter must be a single byte, got '{raw}'")),
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
