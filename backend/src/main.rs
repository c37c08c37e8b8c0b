//! Tabflow CLI - run spreadsheet pipelines from the command line
//!
//! # Main Commands
//!
//! ```bash
//! tabflow run a.csv b.csv --preset orders     # Run a saved preset, print processed rows
//! tabflow audit a.csv --preset orders --transformation lk-1
//! tabflow serve                               # Start HTTP server (port 3000)
//! ```
//!
//! # Store Commands
//!
//! ```bash
//! tabflow preset list|import|export|delete
//! tabflow dataset list|import|delete
//! tabflow template list|import|delete
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tabflow::api::logs::LOG_BROADCASTER;
use tabflow::{
    audit_all, audit_transformation, dataset_from_source, export_csv, export_json, export_missing_values,
    export_presets, import_presets, parse_file_auto, run_pipeline, template_from_matrix, Config,
    MissingValueReport, PipelineInput, Preset, RawSource, Row, Store,
};

#[derive(Parser)]
#[command(name = "tabflow")]
#[command(about = "Assemble, filter, derive and map tabular records", long_about = None)]
struct Cli {
    /// Store directory (default: $TABFLOW_STORE_DIR or .tabflow)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Do not echo pipeline logs
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Stage {
    Configured,
    Processed,
    Template,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over source files
    Run {
        /// Source files, concatenated in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Stored preset id or interchange file (default: empty preset)
        #[arg(short, long)]
        preset: Option<String>,

        /// Stored template id
        #[arg(short, long)]
        template: Option<String>,

        /// Stage to output (default: template when one is given, else processed)
        #[arg(long, value_enum)]
        stage: Option<Stage>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report lookup keys with no match
    Audit {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        preset: String,

        /// Xlookup transformation id (default: every xlookup)
        #[arg(long)]
        transformation: Option<String>,

        /// Write the missing keys as CSV (single transformation only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $TABFLOW_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage saved presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Manage lookup datasets
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Manage output templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    List,
    /// Import every preset of an interchange file
    Import { file: PathBuf },
    /// Export presets as an interchange document
    Export {
        /// Preset ids (default: all)
        ids: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum DatasetAction {
    List,
    /// Import a delimited file (first row is the header)
    Import {
        file: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum TemplateAction {
    List,
    /// Import a delimited file: column names, then optional constants
    Import {
        file: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },
    Delete { id: String },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    LOG_BROADCASTER.set_echo(!cli.quiet);
    let config = Config::from_env().with_store_dir(cli.store);

    let result = match cli.command {
        Commands::Run {
            inputs,
            preset,
            template,
            stage,
            format,
            output,
        } => cmd_run(&config, &inputs, preset.as_deref(), template.as_deref(), stage, format, output.as_deref()),

        Commands::Audit {
            inputs,
            preset,
            transformation,
            output,
        } => cmd_audit(&config, &inputs, &preset, transformation.as_deref(), output.as_deref()),

        Commands::Serve { port } => tabflow::api::start_server(config.with_port(port)).await,

        Commands::Preset { action } => cmd_preset(&config, action),

        Commands::Dataset { action } => cmd_dataset(&config, action),

        Commands::Template { action } => cmd_template(&config, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_sources(inputs: &[PathBuf]) -> Result<Vec<RawSource>, Box<dyn std::error::Error>> {
    let mut sources = Vec::with_capacity(inputs.len());
    for input in inputs {
        let parsed = parse_file_auto(input)?;
        eprintln!(
            "Loaded {} ({}, delimiter '{}', {} rows)",
            input.display(),
            parsed.encoding,
            format_delimiter(parsed.delimiter),
            parsed.source.rows.len()
        );
        sources.push(parsed.source);
    }
    Ok(sources)
}

/// A stored preset id, or the first preset of an interchange file.
fn load_preset(store: &Store, reference: &str) -> Result<Preset, Box<dyn std::error::Error>> {
    if let Ok(preset) = store.presets.get(reference) {
        return Ok(preset.clone());
    }
    let path = Path::new(reference);
    if !path.exists() {
        return Err(format!("Preset not found: {}", reference).into());
    }
    import_presets(&fs::read_to_string(path)?)?
        .into_iter()
        .next()
        .ok_or_else(|| format!("No preset in {}", path.display()).into())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn open_output(path: Option<&Path>) -> std::io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(fs::File::create(p)?),
        None => Box::new(std::io::stdout()),
    })
}

fn write_rows(rows: &[Row], format: Format, output: Option<&Path>) -> CliResult {
    let mut writer = open_output(output)?;
    match format {
        Format::Csv => export_csv(rows, &mut writer)?,
        Format::Json => writeln!(writer, "{}", export_json(rows)?)?,
    }
    if let Some(p) = output {
        eprintln!("Output written to: {}", p.display());
    }
    Ok(())
}

fn cmd_run(
    config: &Config,
    inputs: &[PathBuf],
    preset: Option<&str>,
    template: Option<&str>,
    stage: Option<Stage>,
    format: Format,
    output: Option<&Path>,
) -> CliResult {
    let store = Store::open(&config.store_dir);
    let sources = load_sources(inputs)?;
    let preset = match preset {
        Some(reference) => load_preset(&store, reference)?,
        None => Preset::default(),
    };
    let template = template.map(|id| store.templates.get(id).cloned()).transpose()?;
    let datasets = store.all_datasets();

    let mut input = PipelineInput::new(&sources, &preset).with_datasets(&datasets);
    if let Some(template) = &template {
        input = input.with_template(template);
    }
    let result = run_pipeline(&input)?;

    let diagnostics = &result.diagnostics;
    if let Some(last) = &diagnostics.last_formula_error {
        eprintln!("{} formula error(s), last: {}", diagnostics.formula_errors, last);
    }
    for miss in diagnostics.lookup_misses.iter().take(10) {
        eprintln!(
            "   {}: no match for \"{}\" in {}",
            miss.column,
            miss.miss.key,
            miss.miss.target_name.as_deref().unwrap_or(&miss.miss.target_id)
        );
    }

    let stage = stage.unwrap_or(if template.is_some() { Stage::Template } else { Stage::Processed });
    let rows = match stage {
        Stage::Configured => &result.configured,
        Stage::Processed => &result.processed,
        Stage::Template => result
            .template
            .as_ref()
            .ok_or("The template stage needs --template")?,
    };
    write_rows(rows, format, output)
}

fn print_report(report: &MissingValueReport) {
    let target = report.target_name.as_deref().unwrap_or(&report.target_id);
    if report.target_missing {
        eprintln!("{} ({}): target '{}' no longer exists", report.column, report.transformation_id, target);
    }
    println!(
        "{} ({}): {} of {} key(s) missing in {}",
        report.column,
        report.transformation_id,
        report.missing_count(),
        report.checked_keys,
        target
    );
    for missing in &report.missing {
        println!("   {}", missing.key);
    }
}

fn cmd_audit(
    config: &Config,
    inputs: &[PathBuf],
    preset: &str,
    transformation: Option<&str>,
    output: Option<&Path>,
) -> CliResult {
    let store = Store::open(&config.store_dir);
    let sources = load_sources(inputs)?;
    let preset = load_preset(&store, preset)?;
    let datasets = store.all_datasets();

    let result = run_pipeline(&PipelineInput::new(&sources, &preset).with_datasets(&datasets))?;

    match transformation {
        Some(id) => {
            let report = audit_transformation(&result.configured, &preset, &datasets, id)?;
            print_report(&report);
            if let Some(path) = output {
                export_missing_values(&report, fs::File::create(path)?)?;
                eprintln!("Missing keys written to: {}", path.display());
            }
        }
        None => {
            let reports = audit_all(&result.configured, &preset, &datasets);
            if reports.is_empty() {
                eprintln!("Preset '{}' has no xlookup steps.", preset.name);
            }
            reports.iter().for_each(print_report);
        }
    }
    Ok(())
}

fn cmd_preset(config: &Config, action: PresetAction) -> CliResult {
    let mut store = Store::open(&config.store_dir);

    match action {
        PresetAction::List => {
            let presets = store.presets.list();
            if presets.is_empty() {
                eprintln!("No presets stored yet.");
                eprintln!("   Use 'tabflow preset import <file>' to add some.");
                return Ok(());
            }
            for p in presets {
                println!("  {} ({})", p.name, p.id);
                println!(
                    "     {} filter(s), {} transformation(s)",
                    p.filters.len(),
                    p.transformations.len()
                );
            }
        }

        PresetAction::Import { file } => {
            let presets = import_presets(&fs::read_to_string(&file)?)?;
            for preset in presets {
                let saved = store.presets.save(preset)?;
                eprintln!("Preset saved: {} ({})", saved.name, saved.id);
            }
        }

        PresetAction::Export { ids, output } => {
            let presets: Vec<Preset> = if ids.is_empty() {
                store.presets.list().into_iter().cloned().collect()
            } else {
                ids.iter()
                    .map(|id| store.presets.get(id).cloned())
                    .collect::<Result<_, _>>()?
            };
            let mut writer = open_output(output.as_deref())?;
            writeln!(writer, "{}", export_presets(&presets)?)?;
        }

        PresetAction::Delete { id } => {
            let removed = store.presets.delete(&id)?;
            eprintln!("Preset deleted: {} ({})", removed.name, removed.id);
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("imported")
        .to_string()
}

fn cmd_dataset(config: &Config, action: DatasetAction) -> CliResult {
    let mut store = Store::open(&config.store_dir);

    match action {
        DatasetAction::List => {
            let datasets = store.datasets.list();
            if datasets.is_empty() {
                eprintln!("No datasets stored yet.");
                return Ok(());
            }
            for d in datasets {
                println!("  {} ({})", d.name, d.id);
                println!("     {} rows, columns: {}", d.rows.len(), d.columns.join(", "));
                if let Some(ref modified) = d.last_modified {
                    println!("     Last modified: {}", modified);
                }
            }
        }

        DatasetAction::Import { file, name } => {
            let source = parse_file_auto(&file)?.source;
            let name = name.unwrap_or_else(|| file_stem(&file));
            let saved = store.datasets.save(dataset_from_source("", &name, &source)?)?;
            eprintln!("Dataset saved: {} ({}), {} rows", saved.name, saved.id, saved.rows.len());
        }

        DatasetAction::Delete { id } => {
            store.datasets.delete(&id)?;
            eprintln!("Dataset deleted: {}", id);
        }
    }
    Ok(())
}

fn cmd_template(config: &Config, action: TemplateAction) -> CliResult {
    let mut store = Store::open(&config.store_dir);

    match action {
        TemplateAction::List => {
            let templates = store.templates.list();
            if templates.is_empty() {
                eprintln!("No templates stored yet.");
                return Ok(());
            }
            for t in templates {
                println!("  {} ({})", t.name, t.id);
                let columns: Vec<String> = t
                    .columns
                    .iter()
                    .map(|c| match &c.constant {
                        Some(value) => format!("{} = {}", c.name, value),
                        None => c.name.clone(),
                    })
                    .collect();
                println!("     Columns: {}", columns.join(", "));
            }
        }

        TemplateAction::Import { file, name } => {
            let source = parse_file_auto(&file)?.source;
            let name = name.unwrap_or_else(|| file_stem(&file));
            let saved = store.templates.save(template_from_matrix("", &name, &source.rows))?;
            eprintln!("Template saved: {} ({}), {} column(s)", saved.name, saved.id, saved.columns.len());
        }

        TemplateAction::Delete { id } => {
            store.templates.delete(&id)?;
            eprintln!("Template deleted: {}", id);
        }
    }
    Ok(())
}
