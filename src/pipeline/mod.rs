//! Pipeline controller.
//!
//! [`Monitor`] owns all state shared between the background processing loop
//! and the query surface: the run configuration, both bounded buffers, the
//! current spectrogram and the emission policy, behind one `RwLock`. The
//! novelty model sits beside it in a `OnceCell`, so it is trained at most
//! once per monitor.
//!
//! The loop is a spawned task with a [`CancellationToken`]. It checks the
//! token only between cycles, so [`Monitor::stop`] lets an in-flight cycle
//! finish and then waits for the task to exit.

pub mod buffer;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use self::buffer::{AnomalyBuffer, SampleBuffer, ANOMALY_CAPACITY, SAMPLE_CAPACITY};

use crate::config::{DetectionConfig, PipelineConfig};
use crate::corpus::Corpus;
use crate::detect::novelty::NoveltyModel;
use crate::detect::policy::AnomalyPolicy;
use crate::detect::AnomalyRecord;
use crate::source::{Sample, SampleSource};
use crate::spectrogram::{self, SpectrogramGrid};

/// Samples returned by [`Monitor::recent_samples`].
pub const RECENT_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartStatus {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopStatus {
    #[serde(rename = "stopped")]
    Stopped,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub model_trained: bool,
    pub cycles: u64,
    pub buffered_samples: usize,
    pub buffered_anomalies: usize,
}

/// Outcome of one processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batch: usize,
    pub evicted: usize,
    pub emitted: usize,
}

/// Where batches come from.
pub struct Sources {
    pub replay: Arc<dyn SampleSource>,
    pub live: Option<Arc<dyn SampleSource>>,
    /// Use the live source for every run, not only when the run config asks.
    pub prefer_live: bool,
}

impl Sources {
    pub fn replay_only(replay: Arc<dyn SampleSource>) -> Self {
        Self {
            replay,
            live: None,
            prefer_live: false,
        }
    }

    fn select(&self, config: &DetectionConfig) -> Arc<dyn SampleSource> {
        match &self.live {
            Some(live) if self.prefer_live || config.hardware_connection.enabled => live.clone(),
            _ => self.replay.clone(),
        }
    }
}

struct MonitorState {
    config: DetectionConfig,
    samples: SampleBuffer,
    anomalies: AnomalyBuffer,
    spectrogram: SpectrogramGrid,
    policy: AnomalyPolicy,
    cycles: u64,
}

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RunHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

struct Inner {
    state: RwLock<MonitorState>,
    model: NoveltyModel,
    history: Arc<Corpus>,
    sources: Sources,
    cycle_interval: Duration,
    run: Mutex<Option<RunHandle>>,
}

/// Start/stop-able streaming detection pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(history: Arc<Corpus>, sources: Sources, pacing: &PipelineConfig) -> Self {
        Self::with_model(history, sources, pacing, NoveltyModel::default())
    }

    pub fn with_model(
        history: Arc<Corpus>,
        sources: Sources,
        pacing: &PipelineConfig,
        model: NoveltyModel,
    ) -> Self {
        let state = MonitorState {
            config: DetectionConfig::default(),
            samples: SampleBuffer::default(),
            anomalies: AnomalyBuffer::default(),
            spectrogram: SpectrogramGrid::default(),
            policy: AnomalyPolicy::new(pacing.min_anomaly_interval()),
            cycles: 0,
        };
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                model,
                history,
                sources,
                cycle_interval: pacing.cycle_interval(),
                run: Mutex::new(None),
            }),
        }
    }

    /// Begin processing with `config`. Invalid configurations fall back to
    /// the defaults. While running, the call is refused and the active
    /// configuration is left untouched.
    pub async fn start(&self, config: DetectionConfig) -> StartStatus {
        let mut run = self.inner.run.lock().await;
        if run.as_ref().is_some_and(RunHandle::is_live) {
            debug!("start requested while running, configuration unchanged");
            return StartStatus::AlreadyRunning;
        }

        let config = config.validated_or_default();
        let source = self.inner.sources.select(&config);
        info!(
            source = source.name(),
            low_mhz = config.low_mhz(),
            high_mhz = config.high_mhz(),
            sensitivity = config.sensitivity_threshold,
            model = config.ai_model_enabled,
            "processing started"
        );
        self.inner.state.write().await.config = config;

        let token = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run_loop(source, token.clone()));
        *run = Some(RunHandle { token, task });
        StartStatus::Started
    }

    /// Stop processing. Waits for an in-flight cycle to complete. Idempotent.
    pub async fn stop(&self) -> StopStatus {
        let mut run = self.inner.run.lock().await;
        if let Some(handle) = run.take() {
            handle.token.cancel();
            if let Err(e) = handle.task.await {
                warn!(error = %e, "processing loop ended abnormally");
            }
            info!("processing stopped");
        }
        StopStatus::Stopped
    }

    pub async fn is_running(&self) -> bool {
        self.inner.run.lock().await.as_ref().is_some_and(RunHandle::is_live)
    }

    /// Active (or last used) run configuration.
    pub async fn config(&self) -> DetectionConfig {
        self.inner.state.read().await.config.clone()
    }

    /// The most recent [`RECENT_SAMPLES`] samples, oldest first.
    pub async fn recent_samples(&self) -> Vec<Sample> {
        self.inner.state.read().await.samples.recent(RECENT_SAMPLES)
    }

    /// All buffered anomalies, newest first.
    pub async fn recent_anomalies(&self) -> Vec<AnomalyRecord> {
        self.inner.state.read().await.anomalies.snapshot()
    }

    pub async fn spectrogram(&self) -> SpectrogramGrid {
        self.inner.state.read().await.spectrogram.clone()
    }

    pub async fn clear_anomalies(&self) {
        self.inner.state.write().await.anomalies.clear();
        info!("anomaly buffer cleared");
    }

    pub async fn status(&self) -> MonitorStatus {
        let running = self.is_running().await;
        let state = self.inner.state.read().await;
        MonitorStatus {
            running,
            model_trained: self.inner.model.is_trained(),
            cycles: state.cycles,
            buffered_samples: state.samples.len(),
            buffered_anomalies: state.anomalies.len(),
        }
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>, source: Arc<dyn SampleSource>, token: CancellationToken) {
        debug!(source = source.name(), "processing loop entered");
        while !token.is_cancelled() {
            let report = self.cycle(source.as_ref()).await;
            debug!(
                batch = report.batch,
                evicted = report.evicted,
                emitted = report.emitted,
                "cycle complete"
            );

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.cycle_interval) => {}
            }
        }
        debug!("processing loop exited");
    }

    /// Pull, score, apply policy, update buffers, rebuild the spectrogram.
    async fn cycle(&self, source: &dyn SampleSource) -> CycleReport {
        let config = self.state.read().await.config.clone();
        let batch = source.next_batch(&config).await;

        let scores = if config.ai_model_enabled && !batch.is_empty() {
            let scored = match self.model.train(self.history.samples()).await {
                Ok(()) => self.model.score(&batch),
                Err(e) => Err(e),
            };
            match scored {
                Ok(scores) => Some(scores),
                Err(e) => {
                    warn!(error = %e, "novelty scoring skipped this cycle");
                    None
                }
            }
        } else {
            None
        };
        let now = crate::unix_now();

        let mut state = self.state.write().await;
        let mut report = CycleReport {
            batch: batch.len(),
            evicted: state.samples.extend(batch.iter().copied()),
            emitted: 0,
        };
        if let Some(scores) = scores {
            let records = state.policy.evaluate(&batch, &scores, now, &config);
            report.emitted = records.len();
            for record in records {
                state.anomalies.push(record);
            }
        }
        let grid = spectrogram::build(state.samples.iter());
        state.spectrogram = grid;
        state.cycles += 1;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StubSource {
        batch: Vec<Sample>,
        delay: Duration,
        calls: AtomicUsize,
        entered: Notify,
    }

    impl StubSource {
        fn new(batch: Vec<Sample>) -> Arc<Self> {
            Self::slow(batch, Duration::ZERO)
        }

        fn slow(batch: Vec<Sample>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                batch,
                delay,
                calls: AtomicUsize::new(0),
                entered: Notify::new(),
            })
        }
    }

    #[async_trait::async_trait]
    impl SampleSource for StubSource {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn next_batch(&self, _config: &DetectionConfig) -> Vec<Sample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.batch.clone()
        }
    }

    fn history() -> Arc<Corpus> {
        let rows = (0..600)
            .map(|i| {
                let carrier = [88.5, 95.3, 102.5][i % 3];
                Sample::new(i as f64 * 0.01, carrier, 0.5 + (i % 50) as f64 / 100.0, false)
            })
            .collect();
        Arc::new(Corpus::from_samples(rows))
    }

    fn pacing() -> PipelineConfig {
        PipelineConfig {
            cycle_interval_ms: 10,
            min_anomaly_interval_ms: 2000,
        }
    }

    fn monitor(source: Arc<StubSource>) -> Monitor {
        Monitor::new(history(), Sources::replay_only(source), &pacing())
    }

    fn normal_batch(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(i as f64, 95.3, 0.75, false))
            .collect()
    }

    #[tokio::test]
    async fn test_start_twice_is_already_running() {
        let source = StubSource::new(normal_batch(10));
        let m = monitor(source.clone());

        assert_eq!(m.start(DetectionConfig::default()).await, StartStatus::Started);
        assert_eq!(
            m.start(DetectionConfig::default()).await,
            StartStatus::AlreadyRunning
        );
        assert!(m.is_running().await);

        assert_eq!(m.stop().await, StopStatus::Stopped);
        assert!(!m.is_running().await);
        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // No loop survives the stop.
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);

        assert_eq!(m.start(DetectionConfig::default()).await, StartStatus::Started);
        m.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let m = monitor(StubSource::new(Vec::new()));
        assert_eq!(m.stop().await, StopStatus::Stopped);
        assert_eq!(m.stop().await, StopStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_while_running_keeps_config() {
        let m = monitor(StubSource::new(normal_batch(5)));
        let first = DetectionConfig {
            frequency_range: [88.0, 100.0],
            ..Default::default()
        };
        m.start(first.clone()).await;
        m.start(DetectionConfig {
            frequency_range: [400.0, 500.0],
            ..Default::default()
        })
        .await;
        assert_eq!(m.config().await, first);
        m.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_config_falls_back_to_default() {
        let m = monitor(StubSource::new(Vec::new()));
        m.start(DetectionConfig {
            frequency_range: [100.0, 90.0],
            ..Default::default()
        })
        .await;
        assert_eq!(m.config().await, DetectionConfig::default());
        m.stop().await;
    }

    #[tokio::test]
    async fn test_known_anomaly_emitted_once_per_interval() {
        let mut batch = normal_batch(30);
        batch.push(Sample::new(31.0, 94.2, 0.35, true));
        batch.push(Sample::new(32.0, 97.8, 0.30, true));
        let source = StubSource::new(batch);
        let m = monitor(source.clone());

        let report = m.inner.cycle(source.as_ref()).await;
        assert_eq!(report.batch, 32);
        assert_eq!(report.emitted, 1);
        assert!(m.inner.model.is_trained());

        let anomalies = m.recent_anomalies().await;
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].is_known);
        assert_eq!(anomalies[0].confidence, 0.9);
        assert_eq!(anomalies[0].frequency, 94.2);

        // Immediately after: rate limited.
        let report = m.inner.cycle(source.as_ref()).await;
        assert_eq!(report.emitted, 0);
        assert_eq!(m.recent_anomalies().await.len(), 1);

        m.clear_anomalies().await;
        assert!(m.recent_anomalies().await.is_empty());
    }

    #[tokio::test]
    async fn test_model_disabled_skips_detection() {
        let source = StubSource::new(vec![Sample::new(0.0, 94.2, 4.0, true); 5]);
        let m = monitor(source.clone());
        m.inner.state.write().await.config.ai_model_enabled = false;

        let report = m.inner.cycle(source.as_ref()).await;
        assert_eq!(report.emitted, 0);
        assert!(!m.inner.model.is_trained());
        assert_eq!(m.recent_samples().await.len(), 5);
        assert!(m.recent_anomalies().await.is_empty());
    }

    #[tokio::test]
    async fn test_buffers_bounded_across_cycles() {
        let source = StubSource::new(normal_batch(300));
        let m = monitor(source.clone());
        for cycle in 1..=5 {
            let report = m.inner.cycle(source.as_ref()).await;
            assert_eq!(report.evicted, (cycle * 300usize).saturating_sub(SAMPLE_CAPACITY).min(300));
            assert!(m.status().await.buffered_samples <= SAMPLE_CAPACITY);
        }
        assert_eq!(m.recent_samples().await.len(), RECENT_SAMPLES);

        // 300 distinct timestamps, capped to the newest 50; one frequency.
        let grid = m.spectrogram().await;
        assert_eq!(grid.dimensions(), (50, 1));
        assert_eq!(m.status().await.cycles, 5);
    }

    #[tokio::test]
    async fn test_empty_batch_leaves_state_empty() {
        let source = StubSource::new(Vec::new());
        let m = monitor(source.clone());
        let report = m.inner.cycle(source.as_ref()).await;
        assert_eq!(report, CycleReport::default());
        assert!(m.recent_samples().await.is_empty());
        assert!(m.spectrogram().await.is_empty());
        // No scoring happened, so no training either.
        assert!(!m.inner.model.is_trained());
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_cycle() {
        let source = StubSource::slow(normal_batch(60), Duration::from_millis(150));
        let m = monitor(source.clone());
        m.start(DetectionConfig::default()).await;

        source.entered.notified().await;
        m.stop().await;

        let status = m.status().await;
        assert!(!status.running);
        assert_eq!(status.cycles, 1);
        assert_eq!(status.buffered_samples, 60);
        assert!(!m.spectrogram().await.is_empty());
    }

    #[tokio::test]
    async fn test_live_source_selected_by_run_config() {
        let replay: Arc<dyn SampleSource> = StubSource::new(normal_batch(1));
        let live: Arc<dyn SampleSource> = StubSource::new(normal_batch(2));
        let sources = Sources {
            replay,
            live: Some(live),
            prefer_live: false,
        };

        let mut cfg = DetectionConfig::default();
        assert_eq!(sources.select(&cfg).name(), "stub");
        let chosen = sources.select(&cfg);
        assert_eq!(chosen.next_batch(&cfg).await.len(), 1);

        cfg.hardware_connection.enabled = true;
        let chosen = sources.select(&cfg);
        assert_eq!(chosen.next_batch(&cfg).await.len(), 2);
    }
}
