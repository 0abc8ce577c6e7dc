//! Values that are either inlined in a manifest or read from the environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueOrValueFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    /// Name of an environment variable holding the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_env: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error("unable to find supported value")]
    Unsupported,
}

impl ValueOrValueFrom {
    /// An inline literal value.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            value_from: None,
        }
    }

    /// A value read from the named environment variable.
    pub fn from_env(name: impl Into<String>) -> Self {
        Self {
            value: None,
            value_from: Some(ValueFrom {
                os_env: Some(name.into()),
            }),
        }
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<String, ValueError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with a custom variable lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<String, ValueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = self.value.as_deref().filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }

        match self.value_from.as_ref().and_then(|f| f.os_env.as_deref()) {
            Some(name) if !name.is_empty() => {
                lookup(name).ok_or_else(|| ValueError::MissingEnv(name.to_string()))
            }
            _ => Err(ValueError::Unsupported),
        }
    }
}
