//! Grid CLI
//!
//! Command-line host for viewing, editing, importing and exporting a sheet.

use clap::{Parser, Subcommand, ValueEnum};
use grid_core::{
    write_csv, ColumnType, Dispatch, EnrichmentType, EnrichmentUpdate, GridConfig,
    ImportPipeline, JsonFileGateway, MappingTarget, MergeMode, NoticeLevel, Operation,
    PatchOutcome, PersistenceGateway, Sheet, SheetEditor,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(name = "grid-cli")]
#[command(about = "Spreadsheet grid editor", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true, default_value = "grid.json")]
    config: PathBuf,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sheet
    Show {
        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,

        /// Include hidden columns
        #[arg(short, long)]
        all: bool,

        /// Print the stored JSON document instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rename the sheet
    Rename {
        title: String,
    },

    /// Append a column to the sheet
    AddColumn {
        name: String,

        #[arg(short = 't', long = "type", value_enum, default_value = "text")]
        column_type: ColumnKind,

        /// What an enrichment column looks up
        #[arg(short, long, value_enum)]
        enrichment: Option<EnrichmentKind>,

        /// Prompt for custom enrichment
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Set a cell value
    Edit {
        /// Row id
        #[arg(short, long)]
        row: String,

        /// Column id or name
        #[arg(short, long)]
        column: String,

        value: String,
    },

    /// Flip a checkbox cell
    Toggle {
        #[arg(short, long)]
        row: String,

        #[arg(short, long)]
        column: String,
    },

    /// Set a column's width in pixels
    Resize {
        #[arg(short, long)]
        column: String,

        #[arg(allow_negative_numbers = true)]
        width: i64,
    },

    /// Delete a column and all of its cells
    DeleteColumn {
        column: String,
    },

    /// Hide a column from display
    HideColumn {
        column: String,
    },

    /// Show a hidden column
    ShowColumn {
        column: String,
    },

    /// Import a CSV file, replacing the sheet's contents
    Import {
        /// Path to the CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Rename a header on import (Source=Target)
        #[arg(short, long)]
        map: Vec<String>,

        /// Leave a header out of the import
        #[arg(short, long)]
        skip: Vec<String>,

        /// Keep existing data and append the imported rows
        #[arg(long)]
        append: bool,

        /// Show the mapping preview without importing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export the sheet as CSV
    Export {
        /// Output directory; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record enrichment progress for a cell
    Enrich {
        #[arg(short, long)]
        row: String,

        #[arg(short, long)]
        column: String,

        /// Completed value
        #[arg(long, conflicts_with = "error")]
        value: Option<String>,

        /// Failure message
        #[arg(long)]
        error: Option<String>,
    },

    /// List cells of an enrichment column waiting to be enriched
    EnrichTargets {
        column: String,
    },

    /// Write the effective config to the config path
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColumnKind {
    Text,
    Number,
    Checkbox,
    Enrichment,
}

impl From<ColumnKind> for ColumnType {
    fn from(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Text => ColumnType::Text,
            ColumnKind::Number => ColumnType::Number,
            ColumnKind::Checkbox => ColumnType::Checkbox,
            ColumnKind::Enrichment => ColumnType::Enrichment,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EnrichmentKind {
    Email,
    Phone,
    Company,
    Custom,
}

impl From<EnrichmentKind> for EnrichmentType {
    fn from(kind: EnrichmentKind) -> Self {
        match kind {
            EnrichmentKind::Email => EnrichmentType::Email,
            EnrichmentKind::Phone => EnrichmentType::Phone,
            EnrichmentKind::Company => EnrichmentType::Company,
            EnrichmentKind::Custom => EnrichmentType::Custom,
        }
    }
}

type Editor = SheetEditor<JsonFileGateway>;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> grid_core::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = GridConfig::load(&cli.config)?;
    if let Commands::InitConfig = cli.command {
        config.save(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let mut editor = SheetEditor::open(JsonFileGateway::new(&config.storage_dir), &config);
    let result = run_command(&mut editor, &config, cli.command);
    print_notices(&mut editor);
    result
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(editor: &mut Editor, config: &GridConfig, command: Commands) -> grid_core::Result<()> {
    match command {
        Commands::Show { limit, all, json } => cmd_show(editor.sheet(), limit, all, json),
        Commands::Rename { title } => report(editor.rename(title)?),
        Commands::AddColumn {
            name,
            column_type,
            enrichment,
            prompt,
        } => report(editor.add_column(
            name,
            column_type.into(),
            enrichment.map(Into::into),
            prompt,
        )?),
        Commands::Edit { row, column, value } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            report(edit_cell(editor, &row, &column_id, value)?)
        }
        Commands::Toggle { row, column } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            report(editor.toggle_checkbox(&row, &column_id)?)
        }
        Commands::Resize { column, width } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            report(editor.dispatch(&Operation::ResizeColumn { column_id, width })?)
        }
        Commands::DeleteColumn { column } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            report(editor.delete_column(&column_id)?)
        }
        Commands::HideColumn { column } => set_visibility(editor, &column, false),
        Commands::ShowColumn { column } => set_visibility(editor, &column, true),
        Commands::Import {
            file,
            map,
            skip,
            append,
            dry_run,
        } => cmd_import(editor, config, &file, &map, &skip, append, dry_run),
        Commands::Export { output } => cmd_export(editor, output),
        Commands::Enrich {
            row,
            column,
            value,
            error,
        } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            let update = match (value, error) {
                (Some(value), _) => EnrichmentUpdate::complete(value),
                (None, Some(message)) => EnrichmentUpdate::fail(message),
                (None, None) => EnrichmentUpdate::start(),
            };
            report(editor.dispatch(&Operation::SetEnrichmentState {
                row_id: row,
                column_id,
                update,
            })?)
        }
        Commands::EnrichTargets { column } => {
            let column_id = resolve_column(editor.sheet(), &column)?;
            let targets = editor.enrichment_targets(&column_id);
            println!("{}", serde_json::to_string_pretty(&targets)?);
            Ok(())
        }
        Commands::InitConfig => Ok(()),
    }
}

/// Accept either a column id or a column name
fn resolve_column(sheet: &Sheet, key: &str) -> grid_core::Result<String> {
    sheet
        .find_column(key)
        .or_else(|| sheet.find_column_by_name(key))
        .map(|c| c.id.clone())
        .ok_or_else(|| grid_core::Error::ColumnNotFound(key.to_string()))
}

/// Edit through the session; a missing row or column is a no-op like any dispatched op
fn edit_cell<G: PersistenceGateway>(
    editor: &mut SheetEditor<G>,
    row_id: &str,
    column_id: &str,
    value: String,
) -> grid_core::Result<PatchOutcome> {
    match editor.begin_edit(row_id, column_id) {
        Err(e) if e.is_missing_reference() => {
            return Ok(PatchOutcome::Ignored {
                reason: e.to_string(),
            })
        }
        result => result?,
    }
    editor.set_draft(value)?;
    editor.commit_edit()
}

fn report(outcome: PatchOutcome) -> grid_core::Result<()> {
    match outcome {
        PatchOutcome::Applied => println!("Saved."),
        PatchOutcome::Ignored { reason } => println!("Nothing changed: {}", reason),
    }
    Ok(())
}

fn print_notices(editor: &mut Editor) {
    for notice in editor.drain_notices() {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("{}", notice.message),
        }
    }
}

fn set_visibility(editor: &mut Editor, column: &str, visible: bool) -> grid_core::Result<()> {
    let column_id = resolve_column(editor.sheet(), column)?;
    report(editor.dispatch(&Operation::SetColumnVisibility { column_id, visible })?)
}

fn cmd_show(sheet: &Sheet, limit: Option<usize>, all: bool, json: bool) -> grid_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(sheet)?);
        return Ok(());
    }

    let columns: Vec<&grid_core::Column> = if all {
        sheet.columns.iter().collect()
    } else {
        sheet.visible_columns()
    };

    println!("{} (updated {})", sheet.name, sheet.updated_at.to_rfc3339());
    println!();

    let mut header = vec!["row".to_string()];
    header.extend(
        columns
            .iter()
            .map(|c| format!("{} [{}]", c.name, c.column_type)),
    );
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    let row_limit = limit.unwrap_or(sheet.rows.len());
    for row in sheet.rows.iter().take(row_limit) {
        let mut values = vec![row.id.clone()];
        values.extend(columns.iter().map(|col| match row.get(&col.id) {
            Some(cell) if cell.is_enriching => "(enriching)".to_string(),
            Some(cell) => match &cell.enrichment_error {
                Some(err) => format!("(error: {})", err),
                None => cell.value.to_string_value(),
            },
            None => String::new(),
        }));
        println!("{}", values.join("\t"));
    }

    if sheet.rows.len() > row_limit {
        println!("... ({} more rows)", sheet.rows.len() - row_limit);
    }

    Ok(())
}

fn cmd_import(
    editor: &mut Editor,
    config: &GridConfig,
    file: &Path,
    map: &[String],
    skip: &[String],
    append: bool,
    dry_run: bool,
) -> grid_core::Result<()> {
    let bytes = fs::read(file).map_err(|e| grid_core::Error::FileRead {
        path: file.to_path_buf(),
        source: e,
    })?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut pipeline = ImportPipeline::new(config);
    pipeline.upload(&file_name, &bytes)?;

    for pair in map {
        let (source, target) = pair.split_once('=').ok_or_else(|| {
            grid_core::Error::Import(format!("invalid mapping '{}', expected Source=Target", pair))
        })?;
        pipeline.set_target_for(source, MappingTarget::Rename(target.to_string()))?;
    }
    for header in skip {
        pipeline.set_target_for(header, MappingTarget::Skip)?;
    }
    if append {
        pipeline.set_merge_mode(MergeMode::Append);
    }

    if let Some(parsed) = pipeline.parsed() {
        println!(
            "{}: {} rows, {} columns",
            parsed.source_name,
            parsed.row_count(),
            parsed.column_count()
        );
        for (i, entry) in pipeline.mapping().entries().iter().enumerate() {
            let target = entry.target_name().unwrap_or("(skip)");
            let sample = parsed.sample(i).unwrap_or("");
            println!("  {} -> {}\t{}", entry.source, target, sample);
        }
    }

    if dry_run {
        if let Some(preview) = pipeline.preview() {
            println!();
            println!("{}", preview.headers.join("\t"));
            for row in &preview.rows {
                println!("{}", row.join("\t"));
            }
        }
        return Ok(());
    }

    let summary = editor.import(&mut pipeline, |pct| {
        tracing::debug!(progress = pct, "importing");
    })?;
    println!(
        "Imported {} rows into {} columns",
        summary.rows_imported, summary.columns_imported
    );
    Ok(())
}

fn cmd_export(editor: &Editor, output: Option<PathBuf>) -> grid_core::Result<()> {
    match output {
        Some(dir) => {
            fs::create_dir_all(&dir)?;
            let path = write_csv(editor.sheet(), &dir)?;
            println!("Exported to {}", path.display());
        }
        None => println!("{}", editor.export_csv()),
    }
    Ok(())
}
