use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{ClientGroup, SortDirection, SortField, SortKey, StatusFilter, Task, TaskState, ViewState};

pub const UNKNOWN_CLIENT: &str = "Unknown Client";

/// Filter, search and sort a snapshot for the main task list.
pub fn render_list(tasks: &[Task], view: &ViewState) -> Vec<Task> {
    let mut visible: Vec<Task> = tasks
        .iter()
        .filter(|task| matches_filter(task, &view.filter))
        .filter(|task| matches_search(task, view.search()))
        .cloned()
        .collect();
    sort_tasks(&mut visible, &view.sort);
    visible
}

pub fn matches_filter(task: &Task, filter: &StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Only(state) => &task.state == state,
    }
}

/// `needle` must already be trimmed and lowercased.
pub fn matches_search(task: &Task, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let haystack = [
        task.task_name.as_str(),
        task.task_id.as_str(),
        task.client_name.as_deref().unwrap_or(""),
        task.branch_name.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase();
    haystack.contains(needle)
}

/// Stable sort; equal keys keep their incoming order in both directions.
pub fn sort_tasks(tasks: &mut [Task], key: &SortKey) {
    tasks.sort_by(|a, b| {
        let ordering = compare_by_field(a, b, &key.field);
        match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_by_field(a: &Task, b: &Task, field: &SortField) -> Ordering {
    match field {
        SortField::Updated => timestamp(&a.updated_at).cmp(&timestamp(&b.updated_at)),
        SortField::Created => timestamp(&a.created_at).cmp(&timestamp(&b.created_at)),
        SortField::Name => a.task_name.to_lowercase().cmp(&b.task_name.to_lowercase()),
        SortField::Client => folded(&a.client_name).cmp(&folded(&b.client_name)),
        SortField::State => a.state.as_str().cmp(b.state.as_str()),
        SortField::Unrecognized(_) => Ordering::Equal,
    }
}

fn timestamp(value: &Option<DateTime<Utc>>) -> i64 {
    value.map(|at| at.timestamp_millis()).unwrap_or(0)
}

fn folded(value: &Option<String>) -> String {
    value.as_deref().unwrap_or("").to_lowercase()
}

/// Open tasks grouped by client name, groups in ascending key order, each
/// group newest first.
pub fn group_by_client(tasks: &[Task]) -> Vec<ClientGroup> {
    let mut groups: BTreeMap<String, Vec<Task>> = BTreeMap::new();
    for task in tasks.iter().filter(|task| task.state != TaskState::Completed) {
        let client = task
            .client_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned());
        groups.entry(client).or_default().push(task.clone());
    }

    let newest_first = SortKey {
        field: SortField::Updated,
        direction: SortDirection::Desc,
    };
    groups
        .into_iter()
        .map(|(client_name, mut tasks)| {
            sort_tasks(&mut tasks, &newest_first);
            ClientGroup { client_name, tasks }
        })
        .collect()
}
