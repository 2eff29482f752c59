use crate::features::observability::repo::{MetricsResult, ObservabilityRepository};
use ctrlplane_core::{Event, EventType};
use std::sync::Arc;

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    /// Count `event` and keep the active-instance gauge in step with
    /// creations and deletions
    pub fn record_event(&self, event: &Event) {
        self.repo.inc_lifecycle_event(event.event_type.as_str());
        match event.event_type {
            EventType::InstanceCreated => self.repo.add_active_instances(1),
            EventType::InstanceDeleted => self.repo.add_active_instances(-1),
            _ => {}
        }
    }

    pub fn record_hook_failure(&self, hook: &str, plugin: &str) {
        self.repo.inc_hook_error(hook, plugin);
    }

    pub fn event_count(&self, event_type: EventType) -> u64 {
        self.repo.lifecycle_event_count(event_type.as_str()) as u64
    }

    pub fn hook_failure_count(&self, hook: &str, plugin: &str) -> u64 {
        self.repo.hook_error_count(hook, plugin) as u64
    }

    pub fn active_instances(&self) -> i64 {
        self.repo.active_instances()
    }

    pub fn render_metrics(&self) -> MetricsResult<String> {
        self.repo.render_metrics()
    }
}
