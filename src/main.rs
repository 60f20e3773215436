use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use log::info;

use seaweed_atlas::config::{resolve, PipelineConfig};
use seaweed_atlas::pipeline::hypoxia::{self, HypoxiaInputs};
use seaweed_atlas::pipeline::nutrients::{self, SeasonInput};
use seaweed_atlas::pipeline::suitability::{self, SuitabilityInputs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Seaweed-farming feasibility maps", long_about = None)]
struct Cli {
    /// JSON run configuration (all fields optional)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Root of the shared data volume; relative inputs resolve against it
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    data_root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seasonal nutrient maps (per-season, mean and standard deviation)
    Nutrients {
        /// Variable name used in output file names
        #[arg(long, default_value = "nitrate")]
        variable: String,

        /// Seasonal inputs as SEASON=PATH or atlas file names with a season code
        #[arg(required = true)]
        inputs: Vec<String>,

        #[arg(short, long, default_value = "out/nutrients", value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
    /// Seaweed suitability from N:P ratio, EEZ boundaries and SST
    Suitability {
        #[arg(long, value_hint = ValueHint::FilePath)]
        nitrate: PathBuf,

        #[arg(long, value_hint = ValueHint::FilePath)]
        phosphate: PathBuf,

        /// EEZ boundary polygons (.shp or .geojson)
        #[arg(long, value_hint = ValueHint::FilePath)]
        eez: PathBuf,

        /// Sea-surface temperature GeoTIFF
        #[arg(long, value_hint = ValueHint::FilePath)]
        sst: PathBuf,

        /// Aquaculture production CSV (country, year, species, tonnes)
        #[arg(long, value_hint = ValueHint::FilePath)]
        production: Option<PathBuf>,

        /// Land polygons drawn as background
        #[arg(long, value_hint = ValueHint::FilePath)]
        land: Option<PathBuf>,

        /// Native range lines
        #[arg(long, value_hint = ValueHint::FilePath)]
        native_range: Option<PathBuf>,

        /// Offset-scenario polygons
        #[arg(long, value_hint = ValueHint::FilePath)]
        offsets: Option<PathBuf>,

        #[arg(short, long, default_value = "out/suitability", value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
    /// Hypoxia / eutrophication sites and acidification
    Hypoxia {
        /// Site table CSV (name, country, lat, lon, classification)
        #[arg(long, value_hint = ValueHint::FilePath)]
        sites: PathBuf,

        /// Aragonite saturation GeoTIFF
        #[arg(long, value_hint = ValueHint::FilePath)]
        aragonite: PathBuf,

        /// Country boundary polygons
        #[arg(long, value_hint = ValueHint::FilePath)]
        countries: PathBuf,

        /// Raster whose populated cells bound the gap filling (ocean domain)
        #[arg(long, value_hint = ValueHint::FilePath)]
        domain: PathBuf,

        #[arg(short, long, default_value = "out/hypoxia", value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let root = config.data_root(cli.data_root.as_deref());
    info!("data root: {}", root.display());
    let input = |p: &PathBuf| resolve(&root, p);
    let optional = |p: &Option<PathBuf>| p.as_ref().map(|p| resolve(&root, p));

    match &cli.command {
        Command::Nutrients {
            variable,
            inputs,
            out,
        } => {
            let inputs = inputs
                .iter()
                .map(|arg| {
                    SeasonInput::parse(arg).map(|s| SeasonInput {
                        path: input(&s.path),
                        ..s
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            nutrients::run(&config, variable, &inputs, out)?;
        }
        Command::Suitability {
            nitrate,
            phosphate,
            eez,
            sst,
            production,
            land,
            native_range,
            offsets,
            out,
        } => {
            let inputs = SuitabilityInputs {
                nitrate: input(nitrate),
                phosphate: input(phosphate),
                eez: input(eez),
                sst: input(sst),
                production: optional(production),
                land: optional(land),
                native_range: optional(native_range),
                offsets: optional(offsets),
            };
            suitability::run(&config, &inputs, out)?;
        }
        Command::Hypoxia {
            sites,
            aragonite,
            countries,
            domain,
            out,
        } => {
            let inputs = HypoxiaInputs {
                sites: input(sites),
                aragonite: input(aragonite),
                countries: input(countries),
                domain: input(domain),
            };
            hypoxia::run(&config, &inputs, out)?;
        }
    }

    info!("done");
    Ok(())
}
