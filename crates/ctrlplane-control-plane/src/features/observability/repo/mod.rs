use prometheus::{opts, CounterVec, Encoder, IntGauge, Registry, TextEncoder};

pub type MetricsResult<T> = Result<T, prometheus::Error>;

pub struct ObservabilityRepository {
    registry: Registry,
    lifecycle_events_total: CounterVec,
    hook_errors_total: CounterVec,
    active_instances: IntGauge,
}

impl ObservabilityRepository {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let lifecycle_events_total = CounterVec::new(
            opts!(
                "ctrlplane_lifecycle_events_total",
                "Lifecycle events observed, by event type"
            ),
            &["event"],
        )?;
        let hook_errors_total = CounterVec::new(
            opts!(
                "ctrlplane_plugin_hook_errors_total",
                "Plugin hook calls that failed or timed out"
            ),
            &["hook", "plugin"],
        )?;
        let active_instances = IntGauge::with_opts(opts!(
            "ctrlplane_active_instances",
            "Instances created and not yet deleted"
        ))?;

        registry.register(Box::new(lifecycle_events_total.clone()))?;
        registry.register(Box::new(hook_errors_total.clone()))?;
        registry.register(Box::new(active_instances.clone()))?;

        Ok(Self {
            registry,
            lifecycle_events_total,
            hook_errors_total,
            active_instances,
        })
    }

    pub fn inc_lifecycle_event(&self, event: &str) {
        self.lifecycle_events_total
            .with_label_values(&[event])
            .inc();
    }

    pub fn lifecycle_event_count(&self, event: &str) -> f64 {
        self.lifecycle_events_total
            .with_label_values(&[event])
            .get()
    }

    pub fn inc_hook_error(&self, hook: &str, plugin: &str) {
        self.hook_errors_total
            .with_label_values(&[hook, plugin])
            .inc();
    }

    pub fn hook_error_count(&self, hook: &str, plugin: &str) -> f64 {
        self.hook_errors_total
            .with_label_values(&[hook, plugin])
            .get()
    }

    pub fn add_active_instances(&self, delta: i64) {
        self.active_instances.add(delta);
    }

    pub fn active_instances(&self) -> i64 {
        self.active_instances.get()
    }

    pub fn render_metrics(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled() {
        let repo = ObservabilityRepository::new().unwrap();
        repo.inc_lifecycle_event("instance.created");
        repo.inc_lifecycle_event("instance.created");
        repo.inc_hook_error("on_instance_created", "audit-hook");

        assert_eq!(repo.lifecycle_event_count("instance.created"), 2.0);
        assert_eq!(repo.lifecycle_event_count("instance.deleted"), 0.0);
        assert_eq!(repo.hook_error_count("on_instance_created", "audit-hook"), 1.0);
    }

    #[test]
    fn test_separate_repositories_do_not_share_state() {
        let first = ObservabilityRepository::new().unwrap();
        let second = ObservabilityRepository::new().unwrap();
        first.add_active_instances(3);
        assert_eq!(first.active_instances(), 3);
        assert_eq!(second.active_instances(), 0);
    }
}
