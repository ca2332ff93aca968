//! Optimization job scheduler
//!
//! Each submitted job runs on its own tokio task and owns its population,
//! strategy, evaluator and seeded generator. The scheduler keeps only the
//! shared view of every job: a status watch, a progress broadcast, a
//! cancellation flag and the result slot.

use crate::algorithms::{Optimizer, StepContext};
use crate::config::{EvaluationPolicy, SchedulerConfig};
use crate::error::{FailureCause, FailureKind, OptimizerError, OptimizerResult};
use crate::evaluator::{EvaluationStats, Evaluator};
use crate::fitness::SENTINEL_WORST;
use crate::job::{
    ConvergenceTracker, JobDescriptor, JobHandle, JobResult, JobSnapshot, JobStatus,
};
use crate::metrics::{MetricsCollector, RunMetrics};
use crate::population::{Candidate, Population};
use crate::progression::{LevelUpEvent, ProgressionTracker};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

/// Shared view of one job
struct JobEntry {
    handle: JobHandle,
    cancelled: AtomicBool,
    status: watch::Sender<JobSnapshot>,
    progress: Mutex<Option<broadcast::Sender<JobSnapshot>>>,
    result: RwLock<Option<JobResult>>,
}

impl JobEntry {
    fn new(handle: JobHandle, progress_buffer: usize) -> Self {
        let (status, _) = watch::channel(JobSnapshot::created(handle));
        let (progress, _) = broadcast::channel(progress_buffer);
        Self {
            handle,
            cancelled: AtomicBool::new(false),
            status,
            progress: Mutex::new(Some(progress)),
            result: RwLock::new(None),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> JobSnapshot {
        self.status.borrow().clone()
    }

    fn publish(&self, snapshot: JobSnapshot) {
        self.status.send_replace(snapshot.clone());
        if let Some(sender) = self.progress.lock().as_ref() {
            // No subscribers is fine
            let _ = sender.send(snapshot);
        }
    }

    /// Store the result, publish the terminal snapshot and close the progress stream
    fn complete(&self, result: JobResult, snapshot: JobSnapshot) {
        *self.result.write() = Some(result);
        let mut progress = self.progress.lock();
        self.status.send_replace(snapshot.clone());
        if let Some(sender) = progress.take() {
            let _ = sender.send(snapshot);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        let progress = self.progress.lock();
        match progress.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // Already terminal: a stream holding only the final snapshot
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(self.snapshot());
                receiver
            }
        }
    }
}

/// Finite sequence of job snapshots, ending after the terminal one
pub struct ProgressStream {
    receiver: broadcast::Receiver<JobSnapshot>,
    finished: bool,
}

impl ProgressStream {
    /// Next snapshot, `None` once the job is terminal and drained.
    ///
    /// Snapshots dropped because this consumer fell behind are skipped.
    pub async fn next(&mut self) -> Option<JobSnapshot> {
        if self.finished {
            return None;
        }
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    if snapshot.status.is_terminal() {
                        self.finished = true;
                    }
                    return Some(snapshot);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress consumer lagged");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = JobSnapshot> {
        BroadcastStream::new(self.receiver).filter_map(|item| item.ok())
    }
}

/// Owns all running jobs
pub struct OptimizationScheduler {
    config: SchedulerConfig,
    jobs: DashMap<Uuid, Arc<JobEntry>>,
    job_permits: Arc<Semaphore>,
    progression: Option<Arc<ProgressionTracker>>,
}

impl std::fmt::Debug for OptimizationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationScheduler")
            .field("config", &self.config)
            .field("jobs", &self.jobs.len())
            .field("progression", &self.progression.is_some())
            .finish()
    }
}

impl OptimizationScheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig) -> OptimizerResult<Self> {
        config.validate()?;
        Ok(Self {
            job_permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            jobs: DashMap::new(),
            progression: None,
        })
    }

    /// Fold outcomes of jobs carrying an agent id into profiles
    pub fn with_progression(mut self, tracker: ProgressionTracker) -> Self {
        self.progression = Some(Arc::new(tracker));
        self
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn entry(&self, handle: JobHandle) -> OptimizerResult<Arc<JobEntry>> {
        self.jobs
            .get(&handle.id())
            .map(|e| Arc::clone(e.value()))
            .ok_or(OptimizerError::JobNotFound { job_id: handle.id() })
    }

    /// Validate a descriptor and start the job asynchronously.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_job(&self, descriptor: JobDescriptor) -> OptimizerResult<JobHandle> {
        descriptor.validate()?;
        let optimizer = descriptor
            .algorithm()
            .build(descriptor.population_size())
            .map_err(|e| match e {
                OptimizerError::InvalidDescriptor { .. } => e,
                other => OptimizerError::invalid_descriptor(other.to_string()),
            })?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            OptimizerError::invalid_configuration(format!("no tokio runtime to run the job: {e}"))
        })?;

        let handle = JobHandle::new();
        let entry = Arc::new(JobEntry::new(handle, self.config.progress_buffer));
        self.jobs.insert(handle.id(), Arc::clone(&entry));

        let policy = descriptor
            .evaluation()
            .cloned()
            .unwrap_or_else(|| self.config.default_evaluation.clone());

        info!(
            job_id = %handle,
            algorithm = %descriptor.algorithm().kind(),
            objective = descriptor.objective().name(),
            population = descriptor.population_size(),
            dimensions = descriptor.dimensions(),
            seed = descriptor.seed(),
            "job submitted"
        );

        runtime.spawn(run_job(JobRun {
            entry,
            descriptor,
            optimizer,
            policy,
            job_permits: Arc::clone(&self.job_permits),
            progression: self.progression.clone(),
            log_interval: self.config.log_interval,
        }));

        Ok(handle)
    }

    /// Non-blocking status snapshot
    pub fn get_status(&self, handle: JobHandle) -> OptimizerResult<JobSnapshot> {
        Ok(self.entry(handle)?.snapshot())
    }

    /// Snapshots produced from now until the job is terminal
    pub fn subscribe_progress(&self, handle: JobHandle) -> OptimizerResult<ProgressStream> {
        Ok(ProgressStream {
            receiver: self.entry(handle)?.subscribe(),
            finished: false,
        })
    }

    /// Request cooperative cancellation; takes effect at the next generation boundary
    pub fn cancel(&self, handle: JobHandle) -> OptimizerResult<()> {
        let entry = self.entry(handle)?;
        if !entry.snapshot().status.is_terminal() {
            entry.cancelled.store(true, Ordering::SeqCst);
            info!(job_id = %handle, "cancellation requested");
        }
        Ok(())
    }

    /// Result if the job is terminal, `None` while pending
    pub fn get_result(&self, handle: JobHandle) -> OptimizerResult<Option<JobResult>> {
        Ok(self.entry(handle)?.result.read().clone())
    }

    /// Wait until the job is terminal and return its result
    #[instrument(skip_all, fields(job_id = %handle))]
    pub async fn wait_for_result(&self, handle: JobHandle) -> OptimizerResult<JobResult> {
        let entry = self.entry(handle)?;
        let mut status = entry.status.subscribe();
        status
            .wait_for(|snapshot| snapshot.status.is_terminal())
            .await
            .map_err(|e| OptimizerError::invalid_configuration(format!("status channel closed: {e}")))?;

        let result = entry.result.read().clone();
        result.ok_or(OptimizerError::JobNotFound { job_id: handle.id() })
    }

    /// Drop a terminal job's record and hand back its result.
    ///
    /// Jobs still pending are kept and `None` is returned.
    pub fn forget(&self, handle: JobHandle) -> OptimizerResult<Option<JobResult>> {
        let entry = self.entry(handle)?;
        if !entry.snapshot().status.is_terminal() {
            return Ok(None);
        }
        self.jobs.remove(&handle.id());
        let result = entry.result.read().clone();
        Ok(result)
    }

    /// Snapshots of every known job
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.jobs.iter().map(|e| e.value().snapshot()).collect()
    }
}

/// Everything a job task owns
struct JobRun {
    entry: Arc<JobEntry>,
    descriptor: JobDescriptor,
    optimizer: Box<dyn Optimizer>,
    policy: EvaluationPolicy,
    job_permits: Arc<Semaphore>,
    progression: Option<Arc<ProgressionTracker>>,
    log_interval: u64,
}

/// Job state handed from the generation loop to completion
struct JobState {
    termination: JobStatus,
    last_evaluated: Option<Population>,
    tracker: ConvergenceTracker,
    metrics: RunMetrics,
    stats: EvaluationStats,
}

impl JobState {
    /// State of a job that stopped without a usable generation loop outcome
    fn internal_failure(message: String) -> Self {
        error!(error = %message, "job failed");
        Self {
            termination: JobStatus::Failed(FailureCause {
                kind: FailureKind::Internal,
                message,
            }),
            last_evaluated: None,
            tracker: ConvergenceTracker::default(),
            metrics: RunMetrics::default(),
            stats: EvaluationStats::default(),
        }
    }
}

#[instrument(
    skip_all,
    fields(job_id = %run.entry.handle, algorithm = %run.descriptor.algorithm().kind())
)]
async fn run_job(run: JobRun) {
    let JobRun {
        entry,
        descriptor,
        optimizer,
        policy,
        job_permits,
        progression,
        log_interval,
    } = run;

    let started_at = Utc::now();
    let outcome = match job_permits.acquire_owned().await {
        Ok(_permit) => {
            entry.publish(JobSnapshot {
                status: JobStatus::Running,
                timestamp: Utc::now(),
                ..entry.snapshot()
            });
            info!("job running");

            // A panic in the loop must still end the job
            let driver = tokio::spawn(
                drive(
                    Arc::clone(&entry),
                    descriptor.clone(),
                    optimizer,
                    policy,
                    log_interval,
                )
                .in_current_span(),
            );
            match driver.await {
                Ok(state) => state,
                Err(e) => JobState::internal_failure(format!("job task aborted: {e}")),
            }
        }
        Err(e) => JobState::internal_failure(format!("job permits closed: {e}")),
    };

    finish(&entry, &descriptor, outcome, started_at, progression.as_deref()).await;
}

/// The generation loop: evaluate, record, check termination, step
async fn drive(
    entry: Arc<JobEntry>,
    descriptor: JobDescriptor,
    mut optimizer: Box<dyn Optimizer>,
    policy: EvaluationPolicy,
    log_interval: u64,
) -> JobState {
    let bounds = descriptor.bounds();
    let termination_policy = descriptor.termination();
    let mut rng = StdRng::seed_from_u64(descriptor.seed());
    let evaluator = Evaluator::new(Arc::clone(descriptor.objective()), policy);
    let tolerance = termination_policy
        .stagnation
        .map(|s| s.tolerance)
        .unwrap_or(0.0);
    let mut tracker = ConvergenceTracker::new(tolerance);
    let mut collector = MetricsCollector::new();
    let mut seen = EvaluationStats::default();
    let mut last_evaluated: Option<Population> = None;

    let mut population = Population::initialize(bounds, descriptor.population_size(), &mut rng);

    let termination = loop {
        population = match evaluator.evaluate_population(population).await {
            Ok(evaluated) => evaluated,
            Err(e) => break failure(&e),
        };

        let best_fitness = population.track_best().and_then(|c| c.fitness().cloned());
        let best_primary = best_fitness
            .as_ref()
            .map(|f| f.primary())
            .unwrap_or(SENTINEL_WORST);
        tracker.record(best_primary);

        let stats = evaluator.stats();
        collector.record_evaluations(
            stats.attempts - seen.attempts,
            stats.failed_attempts - seen.failed_attempts,
        );
        seen = stats;
        collector.end_generation(
            best_primary,
            population.average_fitness().unwrap_or(SENTINEL_WORST),
            population.diversity(bounds),
        );

        let generation = tracker.generations();
        debug!(generation, best = best_primary, "generation evaluated");
        if generation % log_interval == 0 {
            info!(
                generation,
                best = best_primary,
                evaluations = stats.attempts,
                improvement_rate = collector
                    .metrics()
                    .history
                    .improvement_rate(log_interval as usize),
                "optimization progress"
            );
        }

        entry.publish(JobSnapshot {
            job_id: entry.handle.id(),
            status: JobStatus::Running,
            generation,
            best_fitness,
            evaluations: stats.attempts,
            timestamp: Utc::now(),
            level_ups: Vec::new(),
        });

        if let Some(status) =
            termination_policy.check(&tracker, entry.is_cancelled(), collector.elapsed())
        {
            last_evaluated = Some(population);
            break status;
        }
        last_evaluated = Some(population.clone());

        let mut ctx = StepContext {
            rng: &mut rng,
            evaluator: &evaluator,
            bounds,
            boundary: descriptor.boundary(),
            generation: population.generation(),
            max_generations: termination_policy.max_generations,
        };
        population = match optimizer.step(population, &mut ctx).await {
            Ok(next) => next,
            Err(e) => break failure(&e),
        };

        if population.size() != descriptor.population_size() {
            break JobStatus::Failed(FailureCause {
                kind: FailureKind::Internal,
                message: format!(
                    "strategy changed the population size from {} to {}",
                    descriptor.population_size(),
                    population.size()
                ),
            });
        }
        if let Err(e) = population.check_dimensions(bounds) {
            break failure(&e);
        }
        population.advance();
    };

    JobState {
        termination,
        last_evaluated,
        tracker,
        metrics: collector.finish(),
        stats: evaluator.stats(),
    }
}

fn failure(error: &OptimizerError) -> JobStatus {
    error!(error = %error, "job failed");
    JobStatus::Failed(FailureCause::from(error))
}

async fn finish(
    entry: &JobEntry,
    descriptor: &JobDescriptor,
    outcome: JobState,
    started_at: DateTime<Utc>,
    progression: Option<&ProgressionTracker>,
) {
    let JobState {
        termination,
        last_evaluated,
        tracker,
        metrics,
        stats,
    } = outcome;

    let (best, final_population): (Option<Candidate>, Vec<Candidate>) = match last_evaluated {
        Some(population) => (population.best().cloned(), population.candidates().to_vec()),
        None => (None, Vec::new()),
    };
    let generations = tracker.generations();

    let result = JobResult {
        job_id: entry.handle.id(),
        algorithm: descriptor.algorithm().kind(),
        objective: descriptor.objective().name().to_string(),
        termination: termination.clone(),
        best,
        history: tracker.into_history(),
        final_population,
        generations,
        population_size: descriptor.population_size(),
        dimensions: descriptor.dimensions(),
        seed: descriptor.seed(),
        agent_id: descriptor.agent_id().map(str::to_string),
        metrics,
        evaluation_stats: stats,
        started_at,
        finished_at: Utc::now(),
    };

    let level_ups: Vec<LevelUpEvent> = match (progression, descriptor.agent_id()) {
        (Some(tracker), Some(agent_id)) => match tracker.record(agent_id, &result).await {
            Ok(update) => update.level_ups,
            Err(e) => {
                warn!(agent_id, error = %e, "failed to record agent outcome");
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    info!(
        status = ?termination,
        generations,
        best = result.best_fitness().unwrap_or(SENTINEL_WORST),
        "job finished"
    );

    let snapshot = JobSnapshot {
        job_id: entry.handle.id(),
        status: termination,
        generation: generations,
        best_fitness: result.best.as_ref().and_then(|c| c.fitness().cloned()),
        evaluations: result.evaluation_stats.attempts,
        timestamp: result.finished_at,
        level_ups,
    };
    entry.complete(result, snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{AlgorithmConfig, DeConfig, PsoConfig};
    use crate::bounds::Bounds;
    use crate::objective::{ObjectiveFunction, Sphere};

    fn sphere() -> Arc<dyn ObjectiveFunction> {
        Arc::new(Sphere::new(Bounds::uniform(2, -5.0, 5.0).unwrap()))
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let scheduler = OptimizationScheduler::new(SchedulerConfig::default()).unwrap();
        let descriptor = JobDescriptor::builder(sphere())
            .algorithm(AlgorithmConfig::DifferentialEvolution(DeConfig::default()))
            .population_size(10)
            .max_generations(5)
            .seed(1)
            .build()
            .unwrap();

        let handle = scheduler.submit_job(descriptor).unwrap();
        let result = scheduler.wait_for_result(handle).await.unwrap();

        assert_eq!(result.termination, JobStatus::MaxGenerationsReached);
        assert_eq!(result.generations, 5);
        assert_eq!(result.history.len(), 5);
        assert_eq!(result.final_population.len(), 10);
        assert_eq!(result.metrics.generations, 5);

        let status = scheduler.get_status(handle).unwrap();
        assert_eq!(status.status, JobStatus::MaxGenerationsReached);
        assert_eq!(status.generation, 5);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let scheduler = OptimizationScheduler::new(SchedulerConfig::default()).unwrap();
        let handle = JobHandle::new();
        assert!(matches!(
            scheduler.get_status(handle),
            Err(OptimizerError::JobNotFound { .. })
        ));
        assert!(scheduler.cancel(handle).is_err());
        assert!(scheduler.get_result(handle).is_err());
    }

    #[tokio::test]
    async fn test_jobs_queue_behind_concurrency_limit() {
        let config = SchedulerConfig::builder().max_concurrent_jobs(1).build().unwrap();
        let scheduler = OptimizationScheduler::new(config).unwrap();

        let handles: Vec<_> = (0..3)
            .map(|seed| {
                let descriptor = JobDescriptor::builder(sphere())
                    .algorithm(AlgorithmConfig::ParticleSwarm(PsoConfig::default()))
                    .population_size(4)
                    .max_generations(4)
                    .seed(seed)
                    .build()
                    .unwrap();
                scheduler.submit_job(descriptor).unwrap()
            })
            .collect();
        assert_eq!(scheduler.jobs().len(), 3);

        for handle in handles {
            let result = scheduler.wait_for_result(handle).await.unwrap();
            assert_eq!(result.termination, JobStatus::MaxGenerationsReached);
        }
    }

    #[tokio::test]
    async fn test_forget_only_removes_terminal_jobs() {
        let scheduler = OptimizationScheduler::new(SchedulerConfig::default()).unwrap();
        let descriptor = JobDescriptor::builder(sphere())
            .population_size(6)
            .max_generations(3)
            .seed(2)
            .build()
            .unwrap();
        let handle = scheduler.submit_job(descriptor).unwrap();
        scheduler.wait_for_result(handle).await.unwrap();

        let forgotten = scheduler.forget(handle).unwrap();
        assert!(forgotten.is_some());
        assert!(matches!(
            scheduler.get_status(handle),
            Err(OptimizerError::JobNotFound { .. })
        ));
    }

    struct PanickingStep;

    #[async_trait::async_trait]
    impl Optimizer for PanickingStep {
        fn kind(&self) -> crate::algorithms::AlgorithmKind {
            crate::algorithms::AlgorithmKind::DifferentialEvolution
        }

        async fn step(
            &mut self,
            _population: Population,
            _ctx: &mut StepContext<'_>,
        ) -> OptimizerResult<Population> {
            panic!("strategy bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_loop_still_fails_job() {
        let descriptor = JobDescriptor::builder(sphere())
            .population_size(6)
            .max_generations(10)
            .seed(4)
            .build()
            .unwrap();
        let handle = JobHandle::new();
        let entry = Arc::new(JobEntry::new(handle, 8));
        let mut status = entry.status.subscribe();

        run_job(JobRun {
            entry: Arc::clone(&entry),
            descriptor,
            optimizer: Box::new(PanickingStep),
            policy: EvaluationPolicy::default(),
            job_permits: Arc::new(Semaphore::new(1)),
            progression: None,
            log_interval: 10,
        })
        .await;

        let snapshot = status.borrow_and_update().clone();
        match snapshot.status {
            JobStatus::Failed(cause) => assert_eq!(cause.kind, FailureKind::Internal),
            other => panic!("expected Failed, got {other:?}"),
        }
        let result = entry.result.read().clone().unwrap();
        assert!(result.termination.is_terminal());
        assert!(result.final_population.is_empty());
    }

    #[test]
    fn test_submit_outside_runtime_is_rejected() {
        let scheduler = OptimizationScheduler::new(SchedulerConfig::default()).unwrap();
        let descriptor = JobDescriptor::builder(sphere()).seed(3).build().unwrap();
        assert!(matches!(
            scheduler.submit_job(descriptor),
            Err(OptimizerError::InvalidConfiguration { .. })
        ));
        assert!(scheduler.jobs().is_empty());
    }
}
