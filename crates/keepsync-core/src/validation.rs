//! Declarative payload validation
//!
//! Each dataset may declare a set of required field paths. A path is a
//! dot-separated walk into the payload object (`"author.id"`); a field
//! satisfies the requirement when it exists and is not `null`, an empty
//! string, or an empty array. Datasets without rules accept any payload.

use std::collections::HashMap;

use serde_json::Value;

use crate::domain::{DatasetId, DomainError};

/// Required-field constraints for one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields {
    paths: Vec<Vec<String>>,
}

impl RequiredFields {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(|p| p.as_ref().split('.').map(str::to_owned).collect())
            .collect();
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Dotted paths of every required field that is absent or blank
    pub fn missing(&self, payload: &Value) -> Vec<String> {
        self.paths
            .iter()
            .filter(|path| !is_filled(lookup(payload, path)))
            .map(|path| path.join("."))
            .collect()
    }
}

fn lookup<'a>(payload: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(payload, |current, segment| current.get(segment.as_str()))
}

fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Per-dataset validation rules
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: HashMap<DatasetId, RequiredFields>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a validator from `dataset -> [paths]` configuration
    ///
    /// # Errors
    /// Returns `InvalidDataset` if a configured dataset name is invalid
    pub fn from_config(config: &HashMap<String, Vec<String>>) -> Result<Self, DomainError> {
        let mut validator = Self::new();
        for (dataset, paths) in config {
            let dataset = DatasetId::new(dataset.as_str())?;
            validator = validator.with_rule(dataset, RequiredFields::new(paths));
        }
        Ok(validator)
    }

    pub fn with_rule(mut self, dataset: DatasetId, fields: RequiredFields) -> Self {
        self.rules.insert(dataset, fields);
        self
    }

    /// Whether `dataset` has any required fields declared
    pub fn requires_validation(&self, dataset: &DatasetId) -> bool {
        self.rules.get(dataset).is_some_and(|r| !r.is_empty())
    }

    /// Checks a payload against the rules of its dataset
    ///
    /// # Errors
    /// Returns `ValidationFailed` naming every missing field
    pub fn validate(&self, dataset: &DatasetId, payload: &Value) -> Result<(), DomainError> {
        let Some(fields) = self.rules.get(dataset) else {
            return Ok(());
        };
        let missing = fields.missing(payload);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::ValidationFailed(format!(
                "{dataset}: missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}
