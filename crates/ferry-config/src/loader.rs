//! Environment parsing and validation.
//!
//! # Design
//! - Parsing goes through a lookup closure so tests never touch process state.
//! - Required variables keep the names used by the hosting environment.
//! - Optional variables are `FERRY_`-prefixed and fall back to `defaults.rs`.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AccountConfig, CopyConfig, DispatchConfig, ListenerConfig, LogSettings, QueueConfig,
    ReplicationConfig, VaultConfig,
};

const SOURCE_URL: &str = "externalDataUrl";
const SOURCE_SECRET: &str = "externalDataSecretName";
const DESTINATION_URL: &str = "internalDataUrl";
const DESTINATION_SECRET: &str = "internalDataSecretName";
const VAULT_NAME: &str = "vaultName";
const QUEUE_URL: &str = "processingQueueUrl";
const QUEUE_SECRET: &str = "processingQueueSecretName";
const QUEUE_NAME: &str = "FERRY_QUEUE_NAME";
const DISPATCH_FOLDER: &str = "FERRY_DISPATCH_FOLDER";
const DISPATCH_EXTENSION: &str = "FERRY_DISPATCH_EXTENSION";
const REFRESH_MARGIN: &str = "FERRY_REFRESH_MARGIN_SECS";
const COPY_MAX_ATTEMPTS: &str = "FERRY_COPY_MAX_ATTEMPTS";
const REQUEST_TIMEOUT: &str = "FERRY_REQUEST_TIMEOUT_SECS";
const BIND_ADDR: &str = "FERRY_BIND_ADDR";
const HTTP_PORT: &str = "FUNCTIONS_CUSTOMHANDLER_PORT";
const LOG_LEVEL: &str = "FERRY_LOG_LEVEL";
const LOG_FORMAT: &str = "FERRY_LOG_FORMAT";
const IDENTITY_CLIENT_ID: &str = "FERRY_MANAGED_IDENTITY_CLIENT_ID";

impl ReplicationConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] for absent required variables and
    /// [`ConfigError::InvalidField`] for values that fail validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ReplicationConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let source = AccountConfig {
            url: env.account_url(SOURCE_URL)?,
            secret_name: env.required(SOURCE_SECRET)?,
        };
        let destination = AccountConfig {
            url: env.account_url(DESTINATION_URL)?,
            secret_name: env.required(DESTINATION_SECRET)?,
        };
        let queue = QueueConfig {
            url: env.account_url(QUEUE_URL)?,
            secret_name: env.required(QUEUE_SECRET)?,
            queue_name: env.optional(QUEUE_NAME).unwrap_or_else(|| defaults::QUEUE_NAME.into()),
        };
        let vault = vault_config(&env.required(VAULT_NAME)?)?;

        let dispatch = DispatchConfig {
            folder: env
                .optional(DISPATCH_FOLDER)
                .unwrap_or_else(|| defaults::DISPATCH_FOLDER.into()),
            extension: env
                .optional(DISPATCH_EXTENSION)
                .unwrap_or_else(|| defaults::DISPATCH_EXTENSION.into()),
        };

        let max_attempts = env.parsed(COPY_MAX_ATTEMPTS, defaults::COPY_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidField {
                field: COPY_MAX_ATTEMPTS,
                reason: "must_be_positive",
                value: Some(max_attempts.to_string()),
            });
        }
        let timeout_secs = env.parsed(REQUEST_TIMEOUT, defaults::REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidField {
                field: REQUEST_TIMEOUT,
                reason: "must_be_positive",
                value: Some(timeout_secs.to_string()),
            });
        }
        let copy = CopyConfig {
            max_attempts,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let margin_secs = env.parsed(REFRESH_MARGIN, defaults::REFRESH_MARGIN_SECS)?;
        if margin_secs > defaults::MAX_REFRESH_MARGIN_SECS {
            return Err(ConfigError::InvalidField {
                field: REFRESH_MARGIN,
                reason: "out_of_range",
                value: Some(margin_secs.to_string()),
            });
        }
        let refresh_margin = Duration::from_secs(margin_secs);

        let default_addr = IpAddr::from_str(defaults::BIND_ADDR).map_err(|_| {
            ConfigError::InvalidField {
                field: BIND_ADDR,
                reason: "invalid_default",
                value: Some(defaults::BIND_ADDR.to_string()),
            }
        })?;
        let listener = ListenerConfig {
            bind_addr: env.parsed(BIND_ADDR, default_addr)?,
            port: env.parsed(HTTP_PORT, defaults::HTTP_PORT)?,
        };

        let logging = LogSettings {
            level: env
                .optional(LOG_LEVEL)
                .unwrap_or_else(|| defaults::LOG_LEVEL.into()),
            format: env.optional(LOG_FORMAT),
        };

        Ok(Self {
            source,
            destination,
            queue,
            vault,
            dispatch,
            copy,
            refresh_margin,
            listener,
            logging,
            identity_client_id: env.optional(IDENTITY_CLIENT_ID),
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> ConfigResult<String> {
        self.optional(name)
            .ok_or(ConfigError::MissingEnv { name })
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
    {
        self.optional(name).map_or(Ok(default), |raw| {
            raw.parse().map_err(|_| ConfigError::InvalidField {
                field: name,
                reason: "unparseable",
                value: Some(raw),
            })
        })
    }

    /// Account endpoints are validated as absolute http(s) URLs and stored
    /// without a trailing slash so path joins stay predictable.
    fn account_url(&self, name: &'static str) -> ConfigResult<String> {
        let raw = self.required(name)?;
        let parsed = Url::parse(&raw).map_err(|_| ConfigError::InvalidField {
            field: name,
            reason: "invalid_url",
            value: None,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidField {
                field: name,
                reason: "unsupported_scheme",
                value: Some(parsed.scheme().to_string()),
            });
        }
        if parsed.query().is_some() {
            return Err(ConfigError::InvalidField {
                field: name,
                reason: "query_not_allowed",
                value: None,
            });
        }
        Ok(raw.trim_end_matches('/').to_string())
    }
}

fn vault_config(name: &str) -> ConfigResult<VaultConfig> {
    let valid = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
    if !valid {
        return Err(ConfigError::InvalidField {
            field: VAULT_NAME,
            reason: "invalid_vault_name",
            value: Some(name.to_string()),
        });
    }
    Ok(VaultConfig {
        name: name.to_string(),
        url: format!("https://{name}.vault.azure.net"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (SOURCE_URL, "https://external.blob.core.windows.net/".to_string()),
            (SOURCE_SECRET, "external-sas".to_string()),
            (DESTINATION_URL, "https://internal.file.core.windows.net".to_string()),
            (DESTINATION_SECRET, "internal-sas".to_string()),
            (VAULT_NAME, "ferry-vault".to_string()),
            (QUEUE_URL, "https://internal.queue.core.windows.net".to_string()),
            (QUEUE_SECRET, "queue-sas".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> ConfigResult<ReplicationConfig> {
        ReplicationConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn loads_required_values_and_defaults() -> ConfigResult<()> {
        let config = load(&base_env())?;
        assert_eq!(config.source.url, "https://external.blob.core.windows.net");
        assert_eq!(config.destination.secret_name, "internal-sas");
        assert_eq!(config.vault.url, "https://ferry-vault.vault.azure.net");
        assert_eq!(config.queue.queue_name, "processing-tasks");
        assert_eq!(config.dispatch.folder, "surge");
        assert_eq!(config.dispatch.extension, "zip");
        assert_eq!(config.copy.max_attempts, 3);
        assert_eq!(config.copy.request_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_margin, Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.format.is_none());
        assert!(config.identity_client_id.is_none());
        Ok(())
    }

    #[test]
    fn optional_overrides_are_applied() -> ConfigResult<()> {
        let mut env = base_env();
        env.insert(QUEUE_NAME, "tasks".into());
        env.insert(COPY_MAX_ATTEMPTS, "5".into());
        env.insert(REFRESH_MARGIN, "60".into());
        env.insert(HTTP_PORT, "7071".into());
        env.insert(BIND_ADDR, "127.0.0.1".into());
        env.insert(LOG_FORMAT, "json".into());
        env.insert(IDENTITY_CLIENT_ID, "client-id".into());
        let config = load(&env)?;
        assert_eq!(config.queue.queue_name, "tasks");
        assert_eq!(config.copy.max_attempts, 5);
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
        assert_eq!(config.listener.port, 7071);
        assert!(config.listener.bind_addr.is_loopback());
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.identity_client_id.as_deref(), Some("client-id"));
        Ok(())
    }

    #[test]
    fn missing_required_value_is_reported() {
        let mut env = base_env();
        env.remove(VAULT_NAME);
        assert!(matches!(
            load(&env),
            Err(ConfigError::MissingEnv { name: "vaultName" })
        ));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = base_env();
        env.insert(SOURCE_SECRET, "   ".into());
        assert!(matches!(
            load(&env),
            Err(ConfigError::MissingEnv {
                name: "externalDataSecretName"
            })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            (DESTINATION_URL, "not a url", "invalid_url"),
            (DESTINATION_URL, "ftp://internal", "unsupported_scheme"),
            (QUEUE_URL, "https://q.example?sig=abc", "query_not_allowed"),
            (VAULT_NAME, "bad/vault", "invalid_vault_name"),
            (COPY_MAX_ATTEMPTS, "0", "must_be_positive"),
            (COPY_MAX_ATTEMPTS, "many", "unparseable"),
            (REQUEST_TIMEOUT, "0", "must_be_positive"),
            (HTTP_PORT, "70000", "unparseable"),
            (REFRESH_MARGIN, "1000000000000000", "out_of_range"),
            (REFRESH_MARGIN, "604801", "out_of_range"),
        ];
        for (field, value, expected) in cases {
            let mut env = base_env();
            env.insert(field, value.to_string());
            match load(&env) {
                Err(ConfigError::InvalidField { reason, .. }) => {
                    assert_eq!(reason, expected, "{field}={value}");
                }
                other => panic!("expected invalid field for {field}, got {other:?}"),
            }
        }
    }
}
