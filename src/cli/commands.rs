use crate::cli::args::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::models::FitResult;
use crate::processors::{
    DispatchSummary, EstimationMethod, ParallelDispatcher, ResultScreener, SiteYearProcessor,
};
use crate::readers::{FluxReader, GlobalCo2Table, LandCoverGrid, SiteCatalog, Whitelist};
use crate::utils::filename::generate_default_fit_filename;
use crate::utils::progress::ProgressReporter;
use crate::utils::stats::mean;
use crate::writers::{CsvWriter, ParquetWriter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

#[derive(Serialize)]
struct RunReport<'a> {
    method: EstimationMethod,
    output: &'a Path,
    summary: &'a DispatchSummary,
}

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"))
}

fn read_fit_table(path: &Path) -> Result<Vec<FitResult>> {
    if is_parquet(path) {
        ParquetWriter::new().read_fits(path)
    } else {
        CsvWriter::new().read_fits(path)
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fit {
            flux_dir,
            site_file,
            lai_file,
            co2_file,
            output,
            method,
            max_workers,
            compression,
            report,
        } => {
            let method = EstimationMethod::from(method);
            let output = output
                .unwrap_or_else(|| generate_default_fit_filename(method.output_suffix()));

            println!("Fitting g1 ({})...", method);
            println!("Flux directory: {}", flux_dir.display());
            println!("Output file: {}", output.display());

            let files = FluxReader::new().discover(&flux_dir)?;
            if files.is_empty() {
                return Err(ProcessingError::MissingData(format!(
                    "No site-year files in {}",
                    flux_dir.display()
                )));
            }

            let catalog = SiteCatalog::load(&site_file, &lai_file)?;
            let co2 = GlobalCo2Table::read(&co2_file)?;
            info!(sites = catalog.len(), files = files.len(), "Inputs loaded");

            let workers = max_workers.or(config.workers).unwrap_or_else(num_cpus::get);
            println!("Site-years: {}, Workers: {}", files.len(), workers);

            let processor = SiteYearProcessor::for_method(method, config.filter, catalog, co2);
            let progress = ProgressReporter::new(files.len() as u64, "Fitting site-years", false);
            let outcome = ParallelDispatcher::new(workers).run(&files, &processor, &progress);
            progress.finish_with_message(&format!(
                "Fitted {} of {} site-years",
                outcome.summary.good, outcome.summary.files
            ));

            // merged order depends on worker timing
            let mut rows = outcome.rows;
            rows.sort_by(|a, b| a.site.cmp(&b.site).then(a.year.cmp(&b.year)));

            create_parent(&output)?;
            if is_parquet(&output) {
                let writer = ParquetWriter::new().with_compression(&compression)?;
                writer.write_fits(&rows, &output)?;
                println!("\n{}", writer.get_file_info(&output)?.summary());
            } else {
                CsvWriter::new().write_fits(&rows, &output)?;
            }

            if !outcome.summary.is_balanced() {
                warn!("Fit table does not hold exactly one row per input file");
            }
            if let Some(report) = report {
                write_json(
                    &RunReport {
                        method,
                        output: &output,
                        summary: &outcome.summary,
                    },
                    &report,
                )?;
            }

            println!(
                "Good: {}, Bad: {}, Elapsed: {:.1}s",
                outcome.summary.good, outcome.summary.bad, outcome.summary.elapsed_seconds
            );
            println!("Fitting complete!");
        }

        Commands::Screen {
            input,
            output,
            land_cover,
            whitelist,
            report,
        } => {
            println!("Screening fit table: {}", input.display());
            let fits = read_fit_table(&input)?;

            let mut screener = ResultScreener::new(config.screening);
            if let Some(path) = land_cover {
                screener = screener.with_land_cover(LandCoverGrid::read(&path)?);
            }
            if let Some(path) = whitelist {
                screener = screener.with_whitelist(Whitelist::read(&path)?);
            }

            let outcome = screener.screen(fits);
            create_parent(&output)?;
            CsvWriter::new().write_screened(&outcome.rows, &output)?;
            if let Some(path) = report {
                write_json(&outcome.report, &path)?;
            }

            let r = &outcome.report;
            println!("\nScreening Summary:");
            println!("- Input rows: {}", r.input_rows);
            println!("- Known bad site-years: {}", r.known_bad);
            println!("- Disturbed sites: {}", r.disturbed);
            println!("- Low r2 or failed fits: {}", r.low_r2);
            println!("- Interannual outliers: {}", r.interannual_outliers);
            println!("- Not whitelisted: {}", r.not_whitelisted);
            println!("- Relabelled C4 crops: {}", r.relabelled_c4);
            println!("- Output rows: {}", r.output_rows);
            println!("Screened table written to {}", output.display());
        }

        Commands::Info { input } => {
            println!("Analyzing fit table: {}", input.display());
            let fits = read_fit_table(&input)?;
            println!("\n{}", summarize(&fits));

            if is_parquet(&input) {
                let file_info = ParquetWriter::new().get_file_info(&input)?;
                println!("\nFile Details:");
                println!("{}", file_info.summary());
            }
        }
    }

    Ok(())
}

/// Good/bad counts, failure stages and mean g1 per PFT
fn summarize(fits: &[FitResult]) -> String {
    let good: Vec<&FitResult> = fits.iter().filter(|r| r.is_good()).collect();

    let mut failures: BTreeMap<&str, usize> = BTreeMap::new();
    for row in fits.iter().filter(|r| !r.is_good()) {
        let stage = row
            .failure_reason
            .split(':')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");
        *failures.entry(stage).or_default() += 1;
    }

    let mut by_pft: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in &good {
        by_pft.entry(row.pft.as_str()).or_default().push(row.g1);
    }

    let mut out = format!(
        "Fit Table Summary:\n- Rows: {}\n- Good fits: {}\n- Bad rows: {}",
        fits.len(),
        good.len(),
        fits.len() - good.len()
    );
    for (stage, count) in &failures {
        out.push_str(&format!("\n  - {}: {}", stage, count));
    }
    if !by_pft.is_empty() {
        out.push_str("\n\nMean g1 by PFT:");
        for (pft, g1) in &by_pft {
            out.push_str(&format!(
                "\n- {:<8} {:>6.2} kPa^0.5 (n={})",
                pft,
                mean(g1).unwrap_or(f64::NAN),
                g1.len()
            ));
        }
    }
    out
}
