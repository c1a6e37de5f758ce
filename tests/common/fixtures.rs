// Test fixtures: scripted probes, synthetic samplers and small catalogs

use havoc::chaos::{ChaosType, ExperimentDefinition, OrchestratorConfig};
use havoc::error::{HavocError, Result};
use havoc::monitor::{HealthProbe, MonitorConfig, ProbeResponse, SystemMetrics, SystemSampler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted probe behavior.
#[derive(Debug, Clone)]
pub enum ProbeStep {
    Respond(ProbeResponse),
    Refuse,
    /// Never answer; the monitor's timeout has to cut the call off
    Hang,
}

/// Probe that plays back a script, repeating the last step when exhausted.
pub struct ScriptedProbe {
    steps: Mutex<VecDeque<ProbeStep>>,
    last: Mutex<ProbeStep>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(steps: Vec<ProbeStep>) -> Arc<Self> {
        let last = steps
            .last()
            .cloned()
            .unwrap_or_else(|| ProbeStep::Respond(ProbeResponse::ok(10.0)));
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(step: ProbeStep) -> Arc<Self> {
        Self::new(vec![step])
    }

    /// Healthy responses with the given latencies, in order.
    pub fn latencies(latencies_ms: &[f64]) -> Arc<Self> {
        Self::new(
            latencies_ms
                .iter()
                .map(|ms| ProbeStep::Respond(ProbeResponse::ok(*ms)))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self) -> Result<ProbeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.last.lock().clone());

        match step {
            ProbeStep::Respond(response) => Ok(response),
            ProbeStep::Refuse => Err(HavocError::ProbeUnreachable("connection refused".into())),
            ProbeStep::Hang => std::future::pending().await,
        }
    }
}

/// Sampler that returns fixed readings, overridable per call.
pub struct SyntheticSampler {
    script: VecDeque<SystemMetrics>,
    fallback: SystemMetrics,
}

impl SyntheticSampler {
    pub fn quiet() -> Self {
        Self::new(Vec::new())
    }

    pub fn new(script: Vec<SystemMetrics>) -> Self {
        Self {
            script: script.into(),
            fallback: quiet_metrics(),
        }
    }
}

impl SystemSampler for SyntheticSampler {
    fn sample(&mut self) -> Result<SystemMetrics> {
        Ok(self.script.pop_front().unwrap_or(self.fallback))
    }
}

pub fn quiet_metrics() -> SystemMetrics {
    SystemMetrics {
        cpu_pct: 12.0,
        mem_pct: 35.0,
        disk_pct: 40.0,
        load_avg: [0.3, 0.3, 0.3],
        cpu_count: 4,
    }
}

pub fn cpu_metrics(cpu_pct: f64) -> SystemMetrics {
    SystemMetrics {
        cpu_pct,
        ..quiet_metrics()
    }
}

pub fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        probe_timeout: Duration::from_millis(500),
        history_capacity: 50,
        ..Default::default()
    }
}

pub fn orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        stop_grace_period: Duration::from_secs(2),
        deadline_slack: Duration::from_millis(300),
        poll_interval: Duration::from_millis(25),
        seed: Some(42),
        memory_ceiling_fraction: 0.25,
        ..Default::default()
    }
}

pub fn definition(
    name: &str,
    chaos_type: ChaosType,
    duration: Duration,
    probability: f64,
) -> ExperimentDefinition {
    ExperimentDefinition::builder()
        .name(name)
        .chaos_type(chaos_type)
        .duration(duration)
        .probability(probability)
        .build()
        .expect("valid test definition")
}
