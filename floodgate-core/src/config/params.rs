use std::str::FromStr;

use indexmap::IndexMap;
use thiserror::Error;

/// Named values supplied when a job is submitted.
///
/// Built once through [SubmissionParametersBuilder] and read-only afterwards. Every component
/// that needs a parameter gets the map passed in explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionParameters {
    values: IndexMap<String, String>,
}

/// Error reading a submission parameter
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// No value was submitted for this name
    #[error("submission parameter `{0}` is not set")]
    Missing(String),
    /// The value does not parse as the requested type
    #[error("submission parameter `{name}` has invalid value `{value}`")]
    Invalid {
        /// Parameter name
        name: String,
        /// Submitted value
        value: String,
    },
}

impl SubmissionParameters {
    /// Start building a parameter map
    pub fn builder() -> SubmissionParametersBuilder {
        SubmissionParametersBuilder::default()
    }

    /// Raw value of a parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value of a parameter parsed as `T`
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, ParameterError> {
        let value = self
            .get(name)
            .ok_or_else(|| ParameterError::Missing(name.to_string()))?;
        value.parse().map_err(|_| ParameterError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Value of a parameter parsed as `T`, or `default` if it is not set
    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, ParameterError> {
        match self.parse(name) {
            Err(ParameterError::Missing(_)) => Ok(default),
            x => x,
        }
    }

    /// All parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no parameters were given
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for SubmissionParameters
where
    N: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::builder(), |b, (name, value)| b.set(name, value))
            .build()
    }
}

impl From<IndexMap<String, String>> for SubmissionParameters {
    fn from(values: IndexMap<String, String>) -> Self {
        Self { values }
    }
}

/// Builder for [SubmissionParameters]
#[derive(Debug, Default)]
pub struct SubmissionParametersBuilder {
    values: IndexMap<String, String>,
}

impl SubmissionParametersBuilder {
    /// Set a parameter, replacing any earlier value of the same name
    pub fn set(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    /// Freeze the parameters
    pub fn build(self) -> SubmissionParameters {
        SubmissionParameters {
            values: self.values,
        }
    }
}
