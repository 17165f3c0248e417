use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub total_duration_ms: f64,
    pub files_converted: u64,
    pub assets_copied: u64,
    pub tool_cache_hits: u64,
    pub tool_cache_misses: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_converted(&self, count: usize) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.files_converted += count as u64;
        }
    }

    pub fn record_copied(&self, count: usize) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.assets_copied += count as u64;
        }
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            if hit {
                guard.tool_cache_hits += 1;
            } else {
                guard.tool_cache_misses += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

/// Records elapsed time for one stage when dropped.
pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.stages.entry(self.stage.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(stage = self.stage.as_str(), duration_ms, "Stage duration recorded");
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        files_converted = snapshot.files_converted,
        assets_copied = snapshot.assets_copied,
        tool_cache_hits = snapshot.tool_cache_hits,
        tool_cache_misses = snapshot.tool_cache_misses,
        "Pipeline metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Stage metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        let counters = [
            ("compendium_files_converted_total", "Documents converted to HTML", self.files_converted),
            ("compendium_assets_copied_total", "Assets copied into the site output", self.assets_copied),
            ("compendium_tool_cache_hits_total", "Tool cache hits", self.tool_cache_hits),
            ("compendium_tool_cache_misses_total", "Tool cache misses", self.tool_cache_misses),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        output.push_str("# HELP compendium_stage_duration_seconds_total Accumulated stage duration in seconds\n");
        output.push_str("# TYPE compendium_stage_duration_seconds_total counter\n");
        output.push_str("# HELP compendium_stage_duration_seconds_max Maximum stage duration in seconds\n");
        output.push_str("# TYPE compendium_stage_duration_seconds_max gauge\n");
        for (stage, metrics) in &self.stages {
            output.push_str(&format!(
                "compendium_stage_duration_seconds_total{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "compendium_stage_duration_seconds_max{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP compendium_pipeline_duration_seconds Total pipeline duration\n");
        output.push_str("# TYPE compendium_pipeline_duration_seconds gauge\n");
        output.push_str(&format!(
            "compendium_pipeline_duration_seconds {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}
