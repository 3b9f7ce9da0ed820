use crate::processors::EstimationMethod;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medlyn-g1")]
#[command(about = "Fit Medlyn stomatal-conductance g1 to flux-tower site-years")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Bulk transfer, gs = ET * P / VPD
    Simple,
    /// Inverted Penman-Monteith
    PenmanMonteith,
}

impl From<Method> for EstimationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Simple => EstimationMethod::Simple,
            Method::PenmanMonteith => EstimationMethod::PenmanMonteith,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit g1 for every site-year file in a directory
    Fit {
        #[arg(short, long, help = "Directory of <SITE>.<YEAR>.*.csv flux files")]
        flux_dir: PathBuf,

        #[arg(long, help = "Site metadata CSV")]
        site_file: PathBuf,

        #[arg(long, help = "Site LAI CSV")]
        lai_file: PathBuf,

        #[arg(long, help = "Global annual mean CO2 CSV")]
        co2_file: PathBuf,

        #[arg(
            short,
            long,
            help = "Output fit table, .csv or .parquet [default: output/g1_fluxnet[_PM]-{YYMMDD}.csv]"
        )]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "simple")]
        method: Method,

        #[arg(long, help = "Worker threads [default: config, then CPU count]")]
        max_workers: Option<usize>,

        #[arg(short, long, default_value = "snappy", help = "Parquet compression")]
        compression: String,

        #[arg(long, help = "Write a JSON run report")]
        report: Option<PathBuf>,
    },

    /// Screen a fit table into the final per-site-year dataset
    Screen {
        #[arg(short, long, help = "Fit table, .csv or .parquet")]
        input: PathBuf,

        #[arg(short, long, help = "Screened output CSV")]
        output: PathBuf,

        #[arg(long, help = "C4 fraction grid CSV")]
        land_cover: Option<PathBuf>,

        #[arg(long, help = "Free/fair-use site-year whitelist CSV")]
        whitelist: Option<PathBuf>,

        #[arg(long, help = "Write the screening report as JSON")]
        report: Option<PathBuf>,
    },

    /// Summarise a fit table
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },
}
