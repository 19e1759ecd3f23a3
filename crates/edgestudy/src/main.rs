//! `edgestudy` - CLI for the Edge AI repository study
//!
//! This binary drives mining, treatment, dataset checks and analyses from
//! the command line.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;

use edgestudy::analysis::{self, Criterion, LikertOptions, Output};
use edgestudy::cli::{
    AnalysisCommand, AnalyzeCommand, CatalogCommand, Cli, Command, ConfigCommand, DatasetCommand,
    MineCommand, TreatCommand,
};
use edgestudy::dataset::{self, ManifestStatus};
use edgestudy::mining::MiningOptions;
use edgestudy::treatment::TreatmentReport;
use edgestudy::{init_logging, Config, GithubClient, Miner, Storage, StudyDataset, Table, Treatment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Flags override the configured level
    init_logging(&config.logging, cli.log_level()).context("failed to initialize logging")?;

    // Execute the command
    match cli.command {
        Command::Mine(cmd) => handle_mine(&config, cmd).await,
        Command::Treat(cmd) => handle_treat(&config, cmd),
        Command::Analyze(cmd) => handle_analyze(&config, cmd),
        Command::Dataset(cmd) => handle_dataset(&config, cmd),
        Command::Catalog(cmd) => handle_catalog(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_mine(config: &Config, cmd: MineCommand) -> anyhow::Result<()> {
    let terms = if cmd.terms.is_empty() {
        config.mining.search_terms.clone()
    } else {
        cmd.terms
    };
    if terms.iter().all(|t| t.trim().is_empty()) {
        bail!("no search terms given; pass --term or set mining.search_terms");
    }

    let mut options = MiningOptions::from_config(config, chrono::Local::now().date_naive());
    options.dry_run = cmd.dry_run;
    if let Some(max_results) = cmd.max_results {
        options.max_results = max_results;
    }

    let client = GithubClient::new(&config.github)?;
    let catalog = if cmd.no_catalog {
        None
    } else {
        Some(Storage::open(config.database_path())?)
    };

    let miner = Miner::new(&client, options);
    let miner = match &catalog {
        Some(storage) => miner.with_catalog(storage),
        None => miner,
    };

    let reports = miner.run(&terms).await?;
    for report in &reports {
        let output = report
            .output_path
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());
        println!(
            "{:<30} found {:>4}  new {:>4}  {output}",
            report.term, report.found, report.new_in_catalog
        );
    }
    Ok(())
}

fn print_treatment(report: &TreatmentReport) {
    println!(
        "{} rows in, {} rows out ({} removed)",
        report.input_rows,
        report.output_rows,
        report.removed()
    );
    println!("Written: {}", report.output_path.display());
}

fn handle_treat(config: &Config, cmd: TreatCommand) -> anyhow::Result<()> {
    let treatment = Treatment::new(config.treatment.clone());
    let report = match cmd {
        TreatCommand::Concat { dir } => treatment.concat_dir(&dir)?,
        TreatCommand::Dedup { file } => Some(treatment.remove_duplicates(&file)?),
        TreatCommand::English { file } => Some(treatment.filter_english(&file)?),
        TreatCommand::Exclude { file, term } => {
            treatment.filter_exclusion_terms(&file, term.as_deref())?
        }
        TreatCommand::Activity { file } => Some(treatment.filter_activity(&file)?),
    };

    match report {
        Some(report) => print_treatment(&report),
        None => println!("Nothing written."),
    }
    Ok(())
}

fn write_and_print(dir: &Path, outputs: &[Output]) -> anyhow::Result<()> {
    for path in analysis::write_outputs(dir, outputs)? {
        println!("Written: {}", path.display());
    }
    Ok(())
}

fn handle_analyze(config: &Config, cmd: AnalyzeCommand) -> anyhow::Result<()> {
    let out_dir = cmd
        .out_dir
        .unwrap_or_else(|| config.analysis.tables_dir.clone());

    match cmd.analysis {
        AnalysisCommand::Kappa {
            input,
            raters,
            slots,
            template,
        } => {
            let raters = if raters.is_empty() {
                config.analysis.raters.clone()
            } else {
                raters
            };
            let table = Table::read(&input)?;
            let results = analysis::capability_agreement(
                &table,
                &raters,
                slots.unwrap_or(config.analysis.capability_slots),
                template
                    .as_deref()
                    .unwrap_or(&config.analysis.rater_column_template),
            )?;
            print_table(&results);
            write_and_print(
                &out_dir,
                &[Output::new(analysis::kappa::KAPPA_RESULTS_FILE, results)],
            )
        }
        AnalysisCommand::Multilabel {
            input,
            col1,
            col2,
            cleaned,
        } => {
            let table = Table::read(&input)?;
            let agreement = analysis::multilabel_agreement(&table, &col1, &col2)?;
            let results = agreement.results_table();
            print_table(&results);
            if let Some(path) = cleaned {
                agreement.cleaned.write(&path)?;
                println!("Written: {}", path.display());
            }
            write_and_print(
                &out_dir,
                &[Output::new(analysis::kappa::MULTILABEL_RESULTS_FILE, results)],
            )
        }
        AnalysisCommand::Coverage {
            input,
            columns,
            true_like,
        } => {
            let columns = if columns.is_empty() {
                config.analysis.coverage_columns.clone()
            } else {
                columns
            };
            let criterion = if true_like {
                Criterion::TrueLike
            } else {
                Criterion::Present
            };
            let table = Table::read(&input)?;
            let results = analysis::column_coverage(&table, &columns, criterion);
            print_table(&results);
            write_and_print(
                &out_dir,
                &[Output::new(analysis::coverage::COVERAGE_FILE, results)],
            )
        }
        AnalysisCommand::Domains { input, col, idcol } => {
            let table = Table::read(&input)?;
            let tables = analysis::domain_distribution(&table, &col, idcol.as_deref())?;
            print_table(&tables.counts);
            write_and_print(&out_dir, &tables.into_outputs())
        }
        AnalysisCommand::Capabilities { input, slots } => {
            let table = Table::read(&input)?;
            let tables = analysis::capability_distribution(
                &table,
                slots.unwrap_or(config.analysis.capability_slots),
            );
            print_table(&tables.counts_iso);
            print_table(&tables.counts_layers);
            write_and_print(&out_dir, &tables.into_outputs())
        }
        AnalysisCommand::ArchLayers { input } => {
            let table = Table::read(&input)?;
            let results = analysis::arch_layer_distribution(&table)?;
            print_table(&results);
            write_and_print(
                &out_dir,
                &[Output::new(analysis::arch_layers::ARCH_LAYERS_FILE, results)],
            )
        }
        AnalysisCommand::Likert {
            input,
            basename,
            scale,
            shorten_labels,
            only_guidelines,
        } => {
            let table = Table::read(&input)?;
            let options = LikertOptions {
                scales: scale.into_iter().map(Into::into).collect(),
                only_guidelines,
                label_map: shorten_labels,
            };
            let tables = analysis::likert_summary(&table, &options);
            if tables.profiles.is_empty() {
                bail!("no Likert column detected in {}", input.display());
            }
            println!("Detected {} Likert questions", tables.profiles.len());
            write_and_print(&out_dir, &tables.into_outputs(&basename))
        }
    }
}

fn print_table(table: &Table) {
    println!("{}", table.headers().join("\t"));
    for row in table.rows() {
        println!("{}", row.join("\t"));
    }
    println!();
}

fn dataset_dir(config: &Config, dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| config.dataset.dir.clone())
}

fn handle_dataset(config: &Config, cmd: DatasetCommand) -> anyhow::Result<()> {
    match cmd {
        DatasetCommand::Check { dir, json } => {
            let dir = dataset_dir(config, dir);
            let study = StudyDataset::load(&dir, &config.dataset)?;
            let report = study.check();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Dataset: {}", dir.display());
                for (table, rows) in &report.row_counts {
                    println!("  {table:<16} {rows:>6} rows");
                }
                println!();
                for violation in &report.violations {
                    println!("{violation}");
                }
                println!(
                    "{} errors, {} warnings",
                    report.errors().count(),
                    report.warnings().count()
                );
            }

            if !report.is_consistent() {
                bail!("dataset is inconsistent");
            }
        }
        DatasetCommand::Manifest { dir } => {
            let dir = dataset_dir(config, dir);
            let path = dataset::write_manifest(&dir)?;
            println!("Written: {}", path.display());
        }
        DatasetCommand::Verify { dir } => {
            let dir = dataset_dir(config, dir);
            let statuses = dataset::verify_manifest(&dir)?;
            let mut drifted = 0;
            for (file, status) in &statuses {
                println!("{:<10} {file}", status.to_string());
                if matches!(status, ManifestStatus::Changed | ManifestStatus::Missing) {
                    drifted += 1;
                }
            }
            if drifted > 0 {
                bail!("{drifted} dataset files differ from the manifest");
            }
        }
    }
    Ok(())
}

fn handle_catalog(config: &Config, cmd: CatalogCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path())?;
    match cmd {
        CatalogCommand::Stats { json } => {
            let stats = storage.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Catalog: {}", storage.path().display());
                println!("---------");
                println!("Repositories:   {}", stats.total_repositories);
                println!("Search terms:   {}", stats.distinct_terms);
                println!("With activity:  {}", stats.with_activity);
                if let (Some(oldest), Some(newest)) = (stats.oldest_first_seen, stats.newest_first_seen) {
                    println!("First seen:     {} .. {}", oldest.date_naive(), newest.date_naive());
                }
                println!("Database size:  {} bytes", stats.db_size_bytes);
            }
        }
        CatalogCommand::List { limit } => {
            for record in storage.list(Some(limit))? {
                println!(
                    "{:>7}  {:<50} {}",
                    record.stargazers_count,
                    record.full_name,
                    record.search_terms.join(", ")
                );
            }
        }
        CatalogCommand::Export { file, year } => {
            let rows = storage.export_csv(&file, year.unwrap_or(config.mining.activity_year))?;
            println!("Exported {rows} repositories to {}", file.display());
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let mut shown = config.clone();
            if shown.github.token.is_some() {
                shown.github.token = Some("********".to_string());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", shown.database_path().display());
                println!();
                println!("[GitHub]");
                println!("  API URL:            {}", shown.github.api_url);
                println!("  Token:              {}", if shown.github.token.is_some() { "set" } else { "not set" });
                println!("  Per page:           {}", shown.github.per_page);
                println!("  Max results:        {}", shown.github.max_results);
                println!("  Max retries:        {}", shown.github.max_retries);
                println!();
                println!("[Mining]");
                println!("  Search terms:       {}", shown.mining.search_terms.len());
                println!("  Min stars:          {}", shown.mining.min_stars);
                println!("  Pushed within days: {}", shown.mining.pushed_within_days);
                println!("  Activity year:      {}", shown.mining.activity_year);
                println!("  Output dir:         {}", shown.mining.output_dir.display());
                println!();
                println!("[Treatment]");
                println!("  Processed dir:      {}", shown.treatment.processed_dir.display());
                println!("  Exclusion terms:    {}", shown.treatment.exclusion_terms.len());
                println!("  Min stars:          {}", shown.treatment.min_stars);
                println!("  Min commits:        {}", shown.treatment.min_commits);
                println!();
                println!("[Dataset]");
                println!("  Directory:          {}", shown.dataset.dir.display());
                println!();
                println!("[Analysis]");
                println!("  Tables dir:         {}", shown.analysis.tables_dir.display());
                println!("  Raters:             {}", shown.analysis.raters.join(", "));
                println!();
                println!("[Logging]");
                println!("  Level:              {}", shown.logging.level);
                println!("  Dependency level:   {}", shown.logging.dependency_level);
                println!(
                    "  Log file:           {}",
                    shown
                        .logging
                        .file
                        .as_ref()
                        .map_or_else(|| "none".to_string(), |p| p.display().to_string())
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
