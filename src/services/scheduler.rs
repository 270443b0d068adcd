use chrono::Utc;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::settings::DEFAULT_INTERVAL_SECONDS;
use crate::output::OutputPipeline;
use crate::services::collector::MeasurementCollector;
use crate::storage::models::{schema_columns, MeasurementBatch, SensorDefinition};
use crate::storage::MeasurementStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sensors: usize,
    pub measurements: usize,
    pub fields: usize,
    pub written: bool,
    pub elapsed: Duration,
}

/// Stops a running scheduler once the in-flight cycle has finished.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        // send_replace never fails, even when the loop has already exited.
        self.shutdown.send_replace(true);
    }
}

/// Drives poll cycles on a fixed interval.
///
/// One task owns the ticker, so a cycle never starts while another is still
/// running. Ticks missed during a slow cycle are dropped rather than queued.
pub struct Scheduler {
    interval: Duration,
    definitions: Vec<SensorDefinition>,
    collector: MeasurementCollector,
    store: Arc<dyn MeasurementStore>,
    output: Option<OutputPipeline>,
    running: AtomicBool,
    schema_ready: AtomicBool,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        definitions: Vec<SensorDefinition>,
        collector: MeasurementCollector,
        store: Arc<dyn MeasurementStore>,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                "⚠️  Zero polling interval; using {} seconds",
                DEFAULT_INTERVAL_SECONDS
            );
            Duration::from_secs(DEFAULT_INTERVAL_SECONDS)
        } else {
            interval
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            interval,
            definitions,
            collector,
            store,
            output: None,
            running: AtomicBool::new(false),
            schema_ready: AtomicBool::new(false),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn with_output(mut self, output: Option<OutputPipeline>) -> Self {
        self.output = output;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Collects every sensor once and writes the batch as a single row.
    ///
    /// Failures are logged and reflected in the report, never returned.
    pub async fn run_cycle(&self) -> CycleReport {
        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let timestamp = Utc::now();

        info!("🔄 Poll cycle started ({} sensor(s))", self.definitions.len());
        let measurements = self.collector.collect(&self.definitions).await;

        if let Some(output) = &self.output {
            output.publish(timestamp, &measurements).await;
        }

        let batch = MeasurementBatch::from_measurements(timestamp, &measurements);
        if batch.is_empty() {
            warn!("⚠️  No sensor produced a value this cycle; writing timestamp only");
        }

        let written = self.write(&batch).await;
        self.running.store(false, Ordering::SeqCst);

        let report = CycleReport {
            sensors: self.definitions.len(),
            measurements: measurements.len(),
            fields: batch.len(),
            written,
            elapsed: started.elapsed(),
        };
        info!(
            "⏱️  Cycle finished in {:?}: {}/{} sensor(s), {} field(s), written: {}",
            report.elapsed, report.measurements, report.sensors, report.fields, report.written
        );
        report
    }

    async fn write(&self, batch: &MeasurementBatch) -> bool {
        if !self.schema_ready.load(Ordering::SeqCst) {
            match self.store.ensure_schema(&schema_columns(&self.definitions)).await {
                Ok(()) => self.schema_ready.store(true, Ordering::SeqCst),
                Err(e) => {
                    error!("❌ Failed to prepare {}: {}", self.store.destination(), e);
                    return false;
                }
            }
        }

        match self.store.insert_row(batch).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "❌ Failed to write batch ({} field(s)) to {}: {}",
                    batch.len(),
                    self.store.destination(),
                    e
                );
                false
            }
        }
    }

    /// Runs cycles until [`SchedulerHandle::stop`] is called. The first cycle
    /// starts immediately.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            info!("🛑 Scheduler stopped before the first cycle");
            return;
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "🚀 Polling {} sensor(s) every {:?}, writing to {}",
            self.definitions.len(),
            self.interval,
            self.store.destination()
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        info!("🛑 Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaEvaluator;
    use crate::modbus::{FunctionCode, RegisterReader, RegisterSpan};
    use crate::storage::models::ColumnSpec;
    use crate::utils::error::{RegisterError, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct Constant(i64);

    #[async_trait]
    impl RegisterReader for Constant {
        async fn read_register(
            &self,
            _device_id: u8,
            _register: u16,
            _function: FunctionCode,
            _signed: bool,
            _span: RegisterSpan,
        ) -> Result<i64, RegisterError> {
            Ok(self.0)
        }
    }

    /// Records inserted batches; the first `failures` inserts fail.
    #[derive(Default)]
    struct RecordingStore {
        failures: usize,
        attempts: AtomicUsize,
        rows: Mutex<Vec<MeasurementBatch>>,
        schema_calls: AtomicUsize,
    }

    #[async_trait]
    impl MeasurementStore for RecordingStore {
        async fn ensure_schema(&self, _columns: &[ColumnSpec]) -> Result<(), StorageError> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_row(&self, batch: &MeasurementBatch) -> Result<(), StorageError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(StorageError::Database("disk I/O error".to_string()));
            }
            self.rows.lock().unwrap().push(batch.clone());
            Ok(())
        }

        fn destination(&self) -> String {
            "memory".to_string()
        }
    }

    fn sensor(id: u8, name: &str, formula: &str) -> SensorDefinition {
        SensorDefinition {
            id,
            output_names: vec![name.to_string()],
            category: "test".to_string(),
            units: vec!["C".to_string()],
            formula: formula.to_string(),
            field_types: vec!["REAL".to_string()],
            signed: true,
            register_span: RegisterSpan::Single,
        }
    }

    fn scheduler(store: Arc<RecordingStore>, every: Duration) -> Scheduler {
        let evaluator = FormulaEvaluator::new(Arc::new(Constant(215)), FunctionCode::ReadInputRegisters);
        Scheduler::new(
            every,
            vec![sensor(5, "temp_c", "0x0001 * 0.1"), sensor(6, "raw", "0x0002")],
            MeasurementCollector::new(evaluator),
            store,
        )
    }

    #[tokio::test]
    async fn one_cycle_writes_one_row() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(store.clone(), Duration::from_secs(10));

        let report = scheduler.run_cycle().await;

        assert!(report.written);
        assert_eq!(report.measurements, 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].get("temp_c").unwrap() - 21.5).abs() < 1e-9);
        assert_eq!(rows[0].get("raw"), Some(215.0));
    }

    #[tokio::test]
    async fn schema_is_prepared_once() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(store.clone(), Duration::from_secs(10));

        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        assert_eq!(store.schema_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn keeps_polling_after_a_failed_write() {
        let store = Arc::new(RecordingStore {
            failures: 1,
            ..RecordingStore::default()
        });
        let scheduler = scheduler(store.clone(), Duration::from_millis(10));
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.attempts.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduler stopped cycling after a failed write");

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(store.rows.lock().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn zero_interval_uses_default_period() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(store.clone(), Duration::ZERO);
        assert_eq!(scheduler.interval(), Duration::from_secs(DEFAULT_INTERVAL_SECONDS));

        // The first tick is immediate; a zero period would panic here.
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run());
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.attempts.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_before_run_skips_every_cycle() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(store.clone(), Duration::from_millis(10));
        scheduler.handle().stop();

        tokio::time::timeout(Duration::from_secs(1), scheduler.run())
            .await
            .unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_sensors_failing_still_writes_timestamp() {
        struct Dead;

        #[async_trait]
        impl RegisterReader for Dead {
            async fn read_register(
                &self,
                device_id: u8,
                register: u16,
                _function: FunctionCode,
                _signed: bool,
                _span: RegisterSpan,
            ) -> Result<i64, RegisterError> {
                Err(RegisterError {
                    device_id,
                    register,
                    attempts: 3,
                    source: crate::utils::error::ModbusError::Timeout,
                })
            }
        }

        let store = Arc::new(RecordingStore::default());
        let evaluator = FormulaEvaluator::new(Arc::new(Dead), FunctionCode::ReadInputRegisters);
        let scheduler = Scheduler::new(
            Duration::from_secs(10),
            vec![sensor(5, "temp_c", "0x0001")],
            MeasurementCollector::new(evaluator),
            store.clone(),
        );

        let report = scheduler.run_cycle().await;

        assert_eq!(report.measurements, 0);
        assert!(report.written);
        assert!(store.rows.lock().unwrap()[0].is_empty());
    }
}
