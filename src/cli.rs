//! The command line interface for the program.
use crate::emission::aggregate_emissions;
use crate::log;
use crate::output::metadata::{RunInputs, write_metadata};
use crate::output::{
    EmissionsReport, create_output_directory, get_output_dir, get_scenario_name,
    get_workbook_file_name,
};
use crate::pollutant::read_pollutant_totals;
use crate::settings::Settings;
use crate::vehicle::{Classifier, load_vehicle_registry};
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to write into the output directory if it already contains files
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to also write the summaries as CSV files
    #[arg(long)]
    pub csv: bool,
    /// TOML file replacing the default vehicle classification table
    #[arg(long)]
    pub classification: Option<PathBuf>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Aggregate warm emission events and write the summary workbook.
    Run {
        /// Path to the vehicle file (e.g. output_vehicles.xml.gz).
        vehicle_file: PathBuf,
        /// Path to the emission event file (e.g. output_event_emission.xml.gz).
        event_file: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Count the vehicles of each type in a vehicle file.
    Vehicles {
        /// Path to the vehicle file.
        vehicle_file: PathBuf,
        /// TOML file replacing the default vehicle classification table
        #[arg(long)]
        classification: Option<PathBuf>,
    },
    /// Sum every pollutant over the cold and warm emission events in an event file.
    Totals {
        /// Path to the emission event file.
        event_file: PathBuf,
    },
    /// Show how vehicle types are assigned to categories.
    Categories {
        /// TOML file replacing the default vehicle classification table
        #[arg(long)]
        classification: Option<PathBuf>,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run {
                vehicle_file,
                event_file,
                opts,
            } => handle_run_command(&vehicle_file, &event_file, &opts, None).map(|_| ()),
            Self::Vehicles {
                vehicle_file,
                classification,
            } => handle_vehicles_command(&vehicle_file, classification.as_deref()),
            Self::Totals { event_file } => handle_totals_command(&event_file),
            Self::Categories { classification } => {
                handle_categories_command(classification.as_deref())
            }
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ emissions-report --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help in markdown format
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn settings_or_load(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Initialise the program logger, unless an earlier command in this process already did
fn init_logger(settings: &Settings, log_file_path: Option<&Path>) -> Result<()> {
    if log::is_logger_initialised() {
        return Ok(());
    }

    log::init(Some(settings.log_level.as_str()), log_file_path)
        .context("Failed to initialise logging.")
}

/// Get the classification table, from the given file if there is one
fn load_classifier(file_path: Option<&Path>) -> Result<Classifier> {
    let Some(file_path) = file_path else {
        return Ok(Classifier::default());
    };

    let classifier = Classifier::from_path(file_path).context("Failed to load classification.")?;
    info!("Using vehicle classification from {}", file_path.display());

    Ok(classifier)
}

/// Handle the `run` command.
///
/// # Returns
///
/// The path to the workbook which was written.
pub fn handle_run_command(
    vehicle_file: &Path,
    event_file: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<PathBuf> {
    let settings = settings_or_load(settings)?;
    let scenario_name = get_scenario_name(event_file)?;

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(&scenario_name);
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    init_logger(&settings, Some(output_path))?;
    info!("Scenario: {scenario_name}");
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Files in output folder will be overwritten");
    }

    let classification_file = opts
        .classification
        .as_deref()
        .or(settings.classification_file.as_deref());
    let classifier = load_classifier(classification_file)?;

    // Each step must complete before the next begins
    let registry = load_vehicle_registry(vehicle_file).context("Failed to load vehicles.")?;
    let table = aggregate_emissions(event_file, &registry, &classifier)
        .context("Failed to aggregate emission events.")?;
    let report = EmissionsReport::from_table(&table);

    let workbook_path = output_path.join(get_workbook_file_name(&scenario_name));
    report.write_workbook(&workbook_path)?;
    if opts.csv || settings.write_csv {
        report.write_csv(output_path)?;
    }

    let inputs = RunInputs {
        vehicle_file,
        event_file,
        classification_file,
    };
    write_metadata(output_path, &inputs, &registry, &table)
        .context("Failed to save metadata.")?;
    info!("Report complete!");

    Ok(workbook_path)
}

/// Handle the `vehicles` command.
pub fn handle_vehicles_command(vehicle_file: &Path, classification: Option<&Path>) -> Result<()> {
    let settings = settings_or_load(None)?;
    init_logger(&settings, None)?;

    let classifier =
        load_classifier(classification.or(settings.classification_file.as_deref()))?;
    let registry = load_vehicle_registry(vehicle_file).context("Failed to load vehicles.")?;
    for (raw_type, count) in registry.type_counts() {
        println!("{raw_type} ({}): {count}", classifier.classify(raw_type));
    }
    println!("Total: {}", registry.len());

    Ok(())
}

/// Handle the `totals` command.
pub fn handle_totals_command(event_file: &Path) -> Result<()> {
    let settings = settings_or_load(None)?;
    init_logger(&settings, None)?;

    let totals = read_pollutant_totals(event_file).context("Failed to sum pollutants.")?;
    for (pollutant, total) in totals.iter() {
        println!("{pollutant}: {total:.2}");
    }

    Ok(())
}

/// Handle the `categories` command.
pub fn handle_categories_command(classification: Option<&Path>) -> Result<()> {
    let settings = settings_or_load(None)?;
    init_logger(&settings, None)?;

    let classifier =
        load_classifier(classification.or(settings.classification_file.as_deref()))?;
    for (category, raw_types) in classifier.iter_groups() {
        if raw_types.is_empty() {
            println!("{category}: (anything else)");
        } else {
            println!("{category}: {}", raw_types.join(", "));
        }
    }

    Ok(())
}
