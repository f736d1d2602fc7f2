//! Client pipelines: which builds a pull request needs, the variables each
//! build runs with, and the pipelines those variables supersede.

mod build_plan;
mod stale;
mod trigger;
mod variables;

use indexmap::IndexMap;

use crate::providers::gitlab::types::PipelineVariable;

pub use build_plan::{build_plan, BuildTarget};
pub use stale::stop_stale_pipelines;
pub use trigger::{create_pipeline_with_retry, pipeline_comment, start_pull_request_pipeline};
pub use variables::assemble_variables;

/// Name of the build parameter carrying the revision of `repo`.
///
/// `mender-connect` becomes `MENDER_CONNECT_REV`.
pub fn repo_to_build_parameter(repo: &str) -> String {
    format!("{}_REV", repo.to_uppercase().replace('-', "_"))
}

/// CI variables of one run, in the order they were assembled.
///
/// Keys are unique. Equality ignores order: both sides are sorted by key
/// before comparing, and empty values take part in the comparison.
#[derive(Debug, Clone, Default)]
pub struct PipelineVariableSet {
    vars: IndexMap<String, String>,
}

impl PipelineVariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its original position when it was already present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variables with a value, for showing to people.
    pub fn displayed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(_, value)| !value.is_empty())
    }

    /// Variables in assembly order, as sent to the CI service.
    pub fn to_variables(&self) -> Vec<PipelineVariable> {
        self.iter()
            .map(|(k, v)| PipelineVariable::new(k, v))
            .collect()
    }

    /// Variables sorted by key.
    pub fn canonical(&self) -> Vec<PipelineVariable> {
        canonicalize(self.to_variables())
    }

    /// Whether a pipeline's variables describe the same run as this set.
    pub fn matches(&self, variables: &[PipelineVariable]) -> bool {
        self.canonical() == canonicalize(variables.to_vec())
    }
}

impl PartialEq for PipelineVariableSet {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for PipelineVariableSet {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PipelineVariableSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, value) in iter {
            set.set(key, value);
        }
        set
    }
}

/// Stable sort by key.
fn canonicalize(mut variables: Vec<PipelineVariable>) -> Vec<PipelineVariable> {
    variables.sort_by(|a, b| a.key.cmp(&b.key));
    variables
}
