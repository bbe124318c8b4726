use std::error::Error;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, error::ErrorKind};

use crate::config::RemoteConfig;
use crate::constants::{files, objects};
use crate::factory::DataFactory;
use crate::store::RemoteStore;

#[derive(Debug, Parser)]
#[command(
    name = "fixture-factory",
    disable_help_subcommand = true,
    about = "Seed and tear down CRM fixture scenarios from CSV sheets",
    long_about = "Seed a remote CRM org from a scenario folder of CSV sheets, update \
                  previously seeded records, or tear a scenario down again in reverse \
                  dependency order.",
    after_help = "Credentials come from CRM_USERNAME / CRM_PASSWORD (plus optional \
                  CRM_TOKEN and CRM_DOMAIN); each accepts a __<ENV> suffixed override."
)]
struct FactoryCli {
    #[arg(long, help = "Name of the scenario folder under the scenario root")]
    scenario: Option<String>,
    #[arg(
        long,
        default_value = "qa",
        help = "Environment whose credentials and variable overrides apply"
    )]
    env: String,
    #[arg(
        long,
        help = "Update records matched by Name instead of creating duplicates"
    )]
    upsert: bool,
    #[arg(long, help = "Delete the scenario's records in reverse file order")]
    delete: bool,
    #[arg(
        long,
        value_name = "PATTERN",
        help = "Delete records whose Name contains PATTERN, then exit"
    )]
    clean: Option<String>,
    #[arg(
        long,
        default_value = objects::PERSON_ACCOUNT,
        help = "Object type targeted by --clean"
    )]
    object: String,
    #[arg(
        long = "scenario-root",
        value_name = "PATH",
        default_value = files::DEFAULT_SCENARIO_ROOT,
        help = "Directory containing scenario folders"
    )]
    scenario_root: PathBuf,
}

/// Runs the operator surface end to end: parse args, load credentials,
/// build the store through the injected closure, then dispatch to the
/// requested factory operation.
///
/// `--help`/`--version` print and return `Ok(())` without touching the
/// environment. A missing mandatory credential fails here, before the
/// store builder runs. Exit-code mapping is the embedder's concern.
pub fn run_cli<S, Build, I>(args_iter: I, build_store: Build) -> Result<(), Box<dyn Error>>
where
    S: RemoteStore,
    Build: FnOnce(&RemoteConfig) -> Result<S, Box<dyn Error>>,
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<FactoryCli, _>(
        std::iter::once("fixture-factory".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = RemoteConfig::from_env(&cli.env)?;
    let store = build_store(&config)?;
    let mut factory = DataFactory::new(store);

    if let Some(pattern) = cli.clean {
        factory.delete_by_pattern(&cli.object, &pattern);
        return Ok(());
    }

    let Some(scenario) = cli.scenario else {
        FactoryCli::command().print_help()?;
        return Ok(());
    };

    let dir = cli.scenario_root.join(scenario);
    if cli.delete {
        factory.cleanup_scenario(&dir)?;
    } else {
        factory.run_scenario(&dir, cli.upsert)?;
    }
    Ok(())
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
