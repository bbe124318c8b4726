use std::env;

use crate::errors::FactoryError;
use crate::types::EnvName;

/// Default CRM domain when `CRM_DOMAIN` is unset (sandbox login host).
pub const DEFAULT_DOMAIN: &str = "test";

/// Credentials and connection settings for the remote CRM store, resolved
/// from the process environment.
///
/// Every variable accepts a per-environment override with a `__<ENV>`
/// suffix: when the environment is `qa`, `CRM_USERNAME__QA` takes
/// precedence over `CRM_USERNAME`. Variables set to an empty string count
/// as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub username: String,
    pub password: String,
    pub token: String,
    pub domain: String,
    pub environment: EnvName,
}

impl RemoteConfig {
    /// Loads the CRM configuration for `environment`.
    ///
    /// `CRM_USERNAME` and `CRM_PASSWORD` are mandatory; a missing one is
    /// reported as [`FactoryError::Configuration`] naming the variable.
    /// `CRM_TOKEN` defaults to empty (IP-allowlisted orgs) and `CRM_DOMAIN`
    /// defaults to [`DEFAULT_DOMAIN`].
    pub fn from_env(environment: &str) -> Result<Self, FactoryError> {
        Ok(Self {
            username: require_var("CRM_USERNAME", environment)?,
            password: require_var("CRM_PASSWORD", environment)?,
            token: lookup_var("CRM_TOKEN", environment).unwrap_or_default(),
            domain: lookup_var("CRM_DOMAIN", environment)
                .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            environment: environment.to_string(),
        })
    }
}

/// Credentials for the remote analytics store.
///
/// Resolved with the same `__<ENV>` override scheme as [`RemoteConfig`];
/// all three variables are mandatory, so load this only when analytics
/// verification is actually requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_base_url: String,
}

impl AnalyticsConfig {
    /// Loads the analytics configuration for `environment`.
    pub fn from_env(environment: &str) -> Result<Self, FactoryError> {
        Ok(Self {
            client_id: require_var("ANALYTICS_CLIENT_ID", environment)?,
            client_secret: require_var("ANALYTICS_CLIENT_SECRET", environment)?,
            auth_base_url: require_var("ANALYTICS_AUTH_URL", environment)?,
        })
    }
}

fn lookup_var(name: &str, environment: &str) -> Option<String> {
    let override_name = format!("{name}__{}", environment.to_ascii_uppercase());
    let value = [override_name.as_str(), name]
        .into_iter()
        .find_map(|candidate| env::var(candidate).ok().filter(|value| !value.is_empty()));
    value
}

fn require_var(name: &str, environment: &str) -> Result<String, FactoryError> {
    lookup_var(name, environment).ok_or_else(|| {
        FactoryError::Configuration(format!("environment variable {name} is not set"))
    })
}

/// Runs `body` with the given variables applied, restoring prior values
/// afterwards. Serialized behind a lock so tests touching the process
/// environment cannot interleave.
#[cfg(test)]
pub(crate) fn with_env<T>(vars: &[(&str, Option<&str>)], body: impl FnOnce() -> T) -> T {
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());
    let _guard = ENV_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let saved: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(name, _)| ((*name).to_string(), env::var(name).ok()))
        .collect();
    for (name, value) in vars {
        match value {
            Some(value) => env::set_var(name, value),
            None => env::remove_var(name),
        }
    }
    let output = body();
    for (name, value) in saved {
        match value {
            Some(value) => env::set_var(&name, value),
            None => env::remove_var(&name),
        }
    }
    output
}
