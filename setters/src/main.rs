//! Setters command line.
//!
//! Creates, sets, deletes, lists and re-applies setters of a package, and
//! with `-R` of every nested package below it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use setters::SetterError;
use setters::core::definition::{Constraints, SetterType};
use setters::core::types::Operation;
use setters::exit_codes;
use setters::io::config::{CONFIG_FILE, SettersConfig, load_config};
use setters::io::packages::Package;
use setters::traverse::{PipelineRun, WalkOptions, walk_packages};
use setters::update::{
    FieldSetter, SetterCreator, SetterDeleter, SetterListing, list_setters, sync_package,
};

#[derive(Parser)]
#[command(
    name = "setters",
    version,
    about = "Keep setter definitions and the fields bound to them in sync"
)]
struct Cli {
    /// Config file (default: `setters.toml` in the package directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Declare a new setter and apply it to fields already bound to it.
    Create {
        #[command(flatten)]
        target: Target,
        /// Setter name.
        name: String,
        /// Scalar value.
        value: Option<String>,
        #[command(flatten)]
        values: ValueArgs,
        /// Value type: string, integer, number, boolean or array.
        #[arg(long = "type", value_parser = parse_type)]
        setter_type: Option<SetterType>,
        /// Allowed values.
        #[arg(long = "enum", num_args = 1..)]
        allowed: Vec<String>,
        /// Regular expression values must match.
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Change a setter's value and every field bound to it.
    Set {
        #[command(flatten)]
        target: Target,
        /// Setter name.
        name: String,
        /// Scalar value.
        value: Option<String>,
        #[command(flatten)]
        values: ValueArgs,
    },
    /// Remove a setter definition.
    Delete {
        #[command(flatten)]
        target: Target,
        /// Setter name.
        name: String,
        /// Remove the markers of fields still bound to the setter.
        #[arg(long)]
        force: bool,
    },
    /// Print setter definitions with the number of bound fields.
    List {
        #[command(flatten)]
        target: Target,
        /// Only this setter.
        name: Option<String>,
    },
    /// Re-apply every definition to the bound fields.
    Sync {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Package directory.
    dir: PathBuf,
    /// Also process nested packages; failures are reported per package.
    #[arg(short = 'R', long = "recurse-subpackages")]
    recursive: bool,
}

#[derive(Args)]
struct ValueArgs {
    /// List values (for array setters).
    #[arg(long = "list-values", num_args = 1..)]
    list_values: Option<Vec<String>>,
    /// Description stored with the setter.
    #[arg(long)]
    description: Option<String>,
    /// Who set the value.
    #[arg(long = "set-by")]
    set_by: Option<String>,
}

fn parse_type(raw: &str) -> std::result::Result<SetterType, String> {
    SetterType::parse(raw).ok_or_else(|| format!("unknown setter type {raw:?}"))
}

fn main() {
    setters::logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SetterError>() {
        Some(err) if err.is_not_found() => exit_codes::NOT_FOUND,
        _ => exit_codes::FAILED,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Create {
            target,
            name,
            value,
            values,
            setter_type,
            allowed,
            pattern,
        } => {
            let config = config_for(cli.config.as_deref(), &target.dir)?;
            let creator = SetterCreator {
                name: name.clone(),
                value,
                list_values: values.list_values,
                setter_type,
                description: values.description.unwrap_or_default(),
                set_by: values.set_by.unwrap_or_default(),
                constraints: Some(Constraints { allowed, pattern }),
            };
            let runs = walk(&target, &config, Operation::Create, |package| {
                creator.create(package, &config)
            })?;
            report(&runs, |run| {
                format!("created setter {name:?} in package {:?}", display(run))
            });
        }
        Command::Set {
            target,
            name,
            value,
            values,
        } => {
            let config = config_for(cli.config.as_deref(), &target.dir)?;
            let shown = match &values.list_values {
                Some(list) if value.is_none() => format!("[{}]", list.join(", ")),
                _ => value.clone().unwrap_or_default(),
            };
            let setter = FieldSetter {
                name: name.clone(),
                value,
                list_values: values.list_values,
                description: values.description,
                set_by: values.set_by,
            };
            let runs = walk(&target, &config, Operation::Set, |package| {
                setter.set(package, &config)
            })?;
            report(&runs, |run| {
                format!(
                    "set {} field(s) of setter {name:?} to value {shown:?} in package {:?}",
                    run.count,
                    display(run)
                )
            });
        }
        Command::Delete {
            target,
            name,
            force,
        } => {
            let config = config_for(cli.config.as_deref(), &target.dir)?;
            let deleter = SetterDeleter {
                name: name.clone(),
                force,
            };
            let runs = walk(&target, &config, Operation::Delete, |package| {
                deleter.delete(package, &config)
            })?;
            report(&runs, |run| {
                format!("deleted setter {name:?} in package {:?}", display(run))
            });
        }
        Command::List { target, name } => {
            let config = config_for(cli.config.as_deref(), &target.dir)?;
            let mut listings = Vec::new();
            let runs = walk(&target, &config, Operation::List, |package| {
                let found = list_setters(package, &config, name.as_deref())?;
                let count = found.len();
                listings.push((package.dir.clone(), found));
                Ok(count)
            })?;
            for (dir, found) in &listings {
                println!("{}", render_listing(dir, found));
            }
            for run in runs.iter().filter(|run| !run.is_ok()) {
                print_failure(run);
            }
        }
        Command::Sync { target } => {
            let config = config_for(cli.config.as_deref(), &target.dir)?;
            let runs = walk(&target, &config, Operation::Sync, |package| {
                sync_package(package, &config)
            })?;
            report(&runs, |run| {
                format!(
                    "synced {} field(s) in package {:?}",
                    run.count,
                    display(run)
                )
            });
        }
    }
    Ok(())
}

fn config_for(explicit: Option<&Path>, dir: &Path) -> Result<SettersConfig> {
    let path = explicit.map_or_else(|| dir.join(CONFIG_FILE), Path::to_path_buf);
    load_config(&path).with_context(|| format!("load config {}", path.display()))
}

fn walk<F>(
    target: &Target,
    config: &SettersConfig,
    operation: Operation,
    visit: F,
) -> Result<Vec<PipelineRun>>
where
    F: FnMut(&Package) -> setters::Result<usize>,
{
    let options = WalkOptions::new(&config.schema_file, operation, target.recursive);
    Ok(walk_packages(&target.dir, &options, visit)?)
}

fn report<F>(runs: &[PipelineRun], success: F)
where
    F: Fn(&PipelineRun) -> String,
{
    for run in runs {
        if run.is_ok() {
            println!("{}\n", success(run));
        } else {
            print_failure(run);
        }
    }
}

fn print_failure(run: &PipelineRun) {
    if let Some(err) = &run.error {
        println!("{err} in package {:?}\n", display(run));
    }
}

fn display(run: &PipelineRun) -> String {
    run.package.dir.display().to_string()
}

fn render_listing(dir: &Path, listings: &[SetterListing]) -> String {
    let header = ["NAME", "VALUE", "SET BY", "DESCRIPTION", "COUNT"];
    let rows: Vec<[String; 5]> = listings
        .iter()
        .map(|listing| {
            let definition = &listing.definition;
            [
                definition.name.clone(),
                definition.value.to_string(),
                definition.set_by.clone(),
                definition.description.clone(),
                listing.count.to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = format!("{}\n", dir.display());
    let mut push_row = |cells: [&str; 5]| {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };
    push_row(header);
    for row in &rows {
        push_row(row.each_ref().map(String::as_str));
    }
    out
}
