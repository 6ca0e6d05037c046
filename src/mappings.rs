use std::sync::Arc;

use regex::Regex;

use crate::api::DashboardApi;
use crate::error::DashError;
use crate::models::{MappingSet, PatternMapping, TaskMapping};

/// Client-name mapping rules. Input is validated locally so a bad pattern
/// never reaches the server.
pub struct MappingService {
    api: Arc<dyn DashboardApi>,
}

impl MappingService {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<MappingSet, DashError> {
        Ok(self.api.list_mappings().await?)
    }

    pub async fn add_pattern(&self, pattern: &str, client_name: &str) -> Result<PatternMapping, DashError> {
        let mapping = PatternMapping {
            pattern: validate_pattern(pattern)?.as_str().to_owned(),
            client_name: required("client name", client_name)?,
        };
        self.api.save_pattern_mapping(&mapping).await?;
        Ok(mapping)
    }

    pub async fn add_task(&self, task_id: &str, client_name: &str) -> Result<TaskMapping, DashError> {
        let mapping = TaskMapping {
            task_id: required("task id", task_id)?,
            client_name: required("client name", client_name)?,
        };
        self.api.save_task_mapping(&mapping).await?;
        Ok(mapping)
    }

    pub async fn remove_pattern(&self, pattern: &str) -> Result<(), DashError> {
        let pattern = required("pattern", pattern)?;
        Ok(self.api.delete_pattern_mapping(&pattern).await?)
    }

    pub async fn remove_task(&self, task_id: &str) -> Result<(), DashError> {
        let task_id = required("task id", task_id)?;
        Ok(self.api.delete_task_mapping(&task_id).await?)
    }
}

pub fn validate_pattern(raw: &str) -> Result<Regex, DashError> {
    let pattern = raw.trim();
    if pattern.is_empty() {
        return Err(DashError::Validation("pattern cannot be empty".to_owned()));
    }
    Regex::new(pattern)
        .map_err(|error| DashError::Validation(format!("invalid pattern '{pattern}': {error}")))
}

fn required(label: &str, raw: &str) -> Result<String, DashError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DashError::Validation(format!("{label} cannot be empty")));
    }
    Ok(value.to_owned())
}

impl MappingSet {
    /// Client for a task: an explicit task mapping wins, then the first
    /// pattern (case-insensitive) matching the task name. Patterns that no
    /// longer compile are skipped.
    pub fn resolve(&self, task_id: &str, task_name: &str) -> Option<&str> {
        if let Some(mapping) = self.tasks.iter().find(|mapping| mapping.task_id == task_id) {
            return Some(&mapping.client_name);
        }
        self.patterns
            .iter()
            .find(|mapping| {
                Regex::new(&format!("(?i){}", mapping.pattern))
                    .map(|regex| regex.is_match(task_name))
                    .unwrap_or_else(|error| {
                        log::warn!("skipping mapping pattern '{}': {error}", mapping.pattern);
                        false
                    })
            })
            .map(|mapping| mapping.client_name.as_str())
    }
}
