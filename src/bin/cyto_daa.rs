//! cyto-daa - response-group differential abundance CLI.

use clap::{Args, Parser, Subcommand};
use cyto_daa::cohort::{cohort_size, distinct_samples, distinct_subjects, samples_per_project};
use cyto_daa::data::{AnalysisConfig, CellCountRecord};
use cyto_daa::error::Result;
use cyto_daa::filter::{apply_filters, FilterSet};
use cyto_daa::freq::derive_frequencies;
use cyto_daa::pipeline::run_analysis;
use std::fs;
use std::path::PathBuf;

/// Differential abundance of immune cell populations across response groups
#[derive(Parser)]
#[command(name = "cyto-daa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Filter flags shared by the subcommands. Omitted flags impose no
/// restriction on that dimension.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Keep only these projects (repeatable)
    #[arg(long = "project")]
    projects: Vec<String>,

    /// Keep only these treatments (repeatable)
    #[arg(long = "treatment")]
    treatments: Vec<String>,

    /// Keep only these response labels (repeatable)
    #[arg(long = "response")]
    responses: Vec<String>,

    /// Keep only these sample types (repeatable)
    #[arg(long = "sample-type")]
    sample_types: Vec<String>,

    /// Keep only these subject conditions (repeatable)
    #[arg(long = "condition")]
    conditions: Vec<String>,

    /// Keep only these subject sexes (repeatable)
    #[arg(long = "sex")]
    sexes: Vec<String>,

    /// Inclusive time range as "min,max" on time_from_treatment_start
    #[arg(long = "time-range", value_parser = parse_time_range)]
    time_range: Option<(f64, f64)>,
}

fn parse_time_range(s: &str) -> std::result::Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err("expected \"min,max\"".to_string());
    }
    let min: f64 = parts[0].trim().parse().map_err(|_| "invalid min")?;
    let max: f64 = parts[1].trim().parse().map_err(|_| "invalid max")?;
    Ok((min, max))
}

impl FilterArgs {
    fn to_filter_set(&self) -> FilterSet {
        let mut filters = FilterSet::new();
        if !self.projects.is_empty() {
            filters = filters.projects(self.projects.clone());
        }
        if !self.treatments.is_empty() {
            filters = filters.treatments(self.treatments.clone());
        }
        if !self.responses.is_empty() {
            filters = filters.responses(self.responses.clone());
        }
        if !self.sample_types.is_empty() {
            filters = filters.sample_types(self.sample_types.clone());
        }
        if !self.conditions.is_empty() {
            filters = filters.conditions(self.conditions.clone());
        }
        if !self.sexes.is_empty() {
            filters = filters.sexes(self.sexes.clone());
        }
        if let Some((min, max)) = self.time_range {
            filters = filters.time_range(min, max);
        }
        filters
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the per-population models and write the corrected result table
    Analyze {
        /// Path to the wide cell-count CSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Output path for the ranked results TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Optional YAML analysis configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Response level treated as the reference (encoded 0)
        #[arg(long, default_value = "no")]
        reference_level: String,

        /// FDR threshold for the significance flag
        #[arg(long, default_value = "0.05")]
        fdr: f64,

        /// Also print the report as JSON to stdout
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Print the joined frequency table as TSV
    Summary {
        /// Path to the wide cell-count CSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Print cohort sizes for the (filtered) table
    Cohort {
        /// Path to the wide cell-count CSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Baseline timepoint for the subject count
        #[arg(long, default_value = "0")]
        timepoint: f64,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            counts,
            output,
            config,
            reference_level,
            fdr,
            json,
            filters,
        } => {
            let records = CellCountRecord::from_csv(&counts)?;

            let mut analysis_config = match config {
                Some(path) => AnalysisConfig::from_yaml(&fs::read_to_string(path)?)?,
                None => AnalysisConfig::default(),
            };
            analysis_config.reference_response_level = reference_level;
            analysis_config.fdr_threshold = fdr;

            let report = run_analysis(&records, &filters.to_filter_set(), &analysis_config)?;
            report.write_tsv(&output)?;

            if json {
                println!("{}", report.to_json()?);
            } else {
                println!(
                    "Tested {} populations, {} significant at FDR {} ({} samples excluded for zero totals)",
                    report.results.iter().filter(|r| r.tested()).count(),
                    report.n_significant(),
                    analysis_config.fdr_threshold,
                    report.n_excluded_samples,
                );
                println!("Results written to {}", output.display());
            }
        }

        Commands::Summary { counts, filters } => {
            let records = CellCountRecord::from_csv(&counts)?;
            let frequencies = derive_frequencies(&records);
            let filtered = apply_filters(&frequencies.records, &filters.to_filter_set());

            println!("sample\tsubject\tproject\tpopulation\tcount\ttotal_count\tpercentage");
            for r in &filtered {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
                    r.base.sample,
                    r.base.subject,
                    r.base.project,
                    r.base.population,
                    r.base.count,
                    r.total_count,
                    r.percent,
                );
            }
            if frequencies.n_excluded_samples > 0 {
                eprintln!(
                    "Excluded {} zero-total samples: {}",
                    frequencies.n_excluded_samples,
                    frequencies.excluded_samples.join(", "),
                );
            }
        }

        Commands::Cohort {
            counts,
            timepoint,
            filters,
        } => {
            let records = CellCountRecord::from_csv(&counts)?;
            let frequencies = derive_frequencies(&records);
            let filtered = apply_filters(&frequencies.records, &filters.to_filter_set());

            println!("subjects at timepoint {}: {}", timepoint, cohort_size(&filtered, timepoint));
            println!("subjects total: {}", distinct_subjects(&filtered));
            println!("samples total: {}", distinct_samples(&filtered));
            for (project, n) in samples_per_project(&filtered) {
                println!("  {}: {} samples", project, n);
            }
        }
    }
    Ok(())
}
