use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Domain metrics
pub static GRANT_MUTATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static LOGIN_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ADMIN_GUARD_REJECTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let metric = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

/// Register all collectors. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = counter(
        &registry,
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"],
    )?;

    let request_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    registry.register(Box::new(request_duration.clone()))?;

    let grant_mutations = counter(
        &registry,
        "grant_mutations_total",
        "Grant create/remove operations by outcome",
        &["operation", "outcome"],
    )?;
    let login_attempts = counter(
        &registry,
        "login_attempts_total",
        "Login attempts by method and outcome",
        &["method", "outcome"],
    )?;
    let guard_rejections = counter(
        &registry,
        "admin_guard_rejections_total",
        "Removals blocked or held for confirmation by the admin guard",
        &["reason"],
    )?;

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = GRANT_MUTATIONS_TOTAL.set(grant_mutations);
    let _ = LOGIN_ATTEMPTS_TOTAL.set(login_attempts);
    let _ = ADMIN_GUARD_REJECTIONS_TOTAL.set(guard_rejections);

    Ok(())
}

pub fn record_grant_mutation(operation: &str, outcome: &str) {
    if let Some(counter) = GRANT_MUTATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

pub fn record_login(method: &str, outcome: &str) {
    if let Some(counter) = LOGIN_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[method, outcome]).inc();
    }
}

pub fn record_guard_rejection(reason: &str) {
    if let Some(counter) = ADMIN_GUARD_REJECTIONS_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_counters_are_exported() {
        init_metrics().unwrap();
        record_grant_mutation("create", "ok");
        record_guard_rejection("last_admin");

        let text = get_metrics();
        assert!(text.contains("grant_mutations_total"));
        assert!(text.contains("admin_guard_rejections_total"));
    }
}
