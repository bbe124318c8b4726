use std::process::ExitCode;

use fixture_factory::{InMemoryStore, RemoteConfig, run_cli};

/// Dry-run entrypoint: drives the full operator surface against the
/// in-memory backend. Deployments embed [`run_cli`] with a store that
/// talks to a real org.
fn main() -> ExitCode {
    let result = run_cli(std::env::args().skip(1), |_config: &RemoteConfig| {
        Ok(InMemoryStore::new())
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("fixture-factory: {error}");
            ExitCode::FAILURE
        }
    }
}
