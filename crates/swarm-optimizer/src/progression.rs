//! Agent experience and level progression
//!
//! Finished jobs are folded into an agent's profile by a pure reducer,
//! [`record_outcome`]. Experience grows with the improvement a job achieved
//! and with the size of the problem it solved. Crossing a level threshold
//! emits a [`LevelUpEvent`].

use crate::algorithms::AlgorithmKind;
use crate::error::{OptimizerError, OptimizerResult};
use crate::job::{JobResult, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Experience required to reach each level; index 0 is level 1
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 500, 1000, 2000, 4000, 8000, 16000, 32000];

/// Level reached with the given experience
pub fn level_for_experience(experience: u64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .take_while(|&&threshold| experience >= threshold)
        .count() as u32
}

/// Experience needed for the level after `level`, `None` at the cap
pub fn experience_for_next_level(level: u32) -> Option<u64> {
    LEVEL_THRESHOLDS.get(level as usize).copied()
}

/// One job outcome as remembered by a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Job that produced the outcome
    pub job_id: Uuid,
    /// Algorithm used
    pub algorithm: AlgorithmKind,
    /// Terminal state
    pub termination: JobStatus,
    /// Best fitness after the first generation
    pub initial_best: Option<f64>,
    /// Final best fitness
    pub final_best: Option<f64>,
    /// Relative improvement in [0, 1]
    pub improvement: f64,
    /// Dimensionality times population size
    pub difficulty: f64,
    /// Experience granted
    pub experience_gained: u64,
    /// When the outcome was folded in
    pub recorded_at: DateTime<Utc>,
}

/// Accumulated experience of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier
    pub agent_id: String,
    /// Total experience
    pub experience: u64,
    /// Current level, starting at 1
    pub level: u32,
    /// Outcomes in recording order
    pub history: Vec<OutcomeRecord>,
}

impl AgentProfile {
    /// Fresh level-1 profile
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            experience: 0,
            level: 1,
            history: Vec::new(),
        }
    }

    /// Experience still needed for the next level, `None` at the cap
    pub fn experience_to_next_level(&self) -> Option<u64> {
        experience_for_next_level(self.level).map(|next| next.saturating_sub(self.experience))
    }
}

/// Emitted when an outcome pushes a profile across a level threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelUpEvent {
    /// Agent that levelled up
    pub agent_id: String,
    /// Level before
    pub previous_level: u32,
    /// Level reached
    pub new_level: u32,
    /// Experience at the time
    pub experience: u64,
    /// Job that triggered the level-up
    pub job_id: Uuid,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Tunable experience formula.
///
/// `xp = base + improvement_weight · improvement · (1 + difficulty_weight · ln(1 + difficulty))`,
/// floored and capped at `max_reward`. Failed and cancelled jobs earn nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperiencePolicy {
    /// Granted for any successfully finished job
    pub base_reward: f64,
    /// Weight of the relative improvement
    pub improvement_weight: f64,
    /// Weight of the log-difficulty bonus
    pub difficulty_weight: f64,
    /// Cap per job
    pub max_reward: u64,
}

impl Default for ExperiencePolicy {
    fn default() -> Self {
        Self {
            base_reward: 10.0,
            improvement_weight: 100.0,
            difficulty_weight: 0.5,
            max_reward: 1000,
        }
    }
}

impl ExperiencePolicy {
    /// Validate the policy
    pub fn validate(&self) -> OptimizerResult<()> {
        for (name, value) in [
            ("base_reward", self.base_reward),
            ("improvement_weight", self.improvement_weight),
            ("difficulty_weight", self.difficulty_weight),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(OptimizerError::invalid_configuration(format!(
                    "experience {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Relative improvement from `initial` to `last`, clamped to [0, 1]
    pub fn relative_improvement(initial: f64, last: f64) -> f64 {
        if !initial.is_finite() || !last.is_finite() {
            return 0.0;
        }
        let gain = initial - last;
        if !(gain > 0.0) {
            return 0.0;
        }
        (gain / (initial.abs() + f64::EPSILON)).clamp(0.0, 1.0)
    }

    /// Problem difficulty
    pub fn difficulty(dimensions: usize, population_size: usize) -> f64 {
        (dimensions * population_size) as f64
    }

    /// Experience for an improvement in [0, 1] at a difficulty
    pub fn experience_for(&self, improvement: f64, difficulty: f64) -> u64 {
        let bonus = 1.0 + self.difficulty_weight * difficulty.max(0.0).ln_1p();
        let raw = self.base_reward + self.improvement_weight * improvement.clamp(0.0, 1.0) * bonus;
        (raw.floor().max(0.0) as u64).min(self.max_reward)
    }
}

/// Result of folding one job into a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionUpdate {
    /// Updated profile
    pub profile: AgentProfile,
    /// Experience granted for the job
    pub experience_gained: u64,
    /// Thresholds crossed, one event per level
    pub level_ups: Vec<LevelUpEvent>,
}

/// Fold a terminal job result into a profile. Pure: the input profile is not modified.
pub fn record_outcome(
    profile: &AgentProfile,
    result: &JobResult,
    policy: &ExperiencePolicy,
) -> ProgressionUpdate {
    let initial = result.initial_best_fitness();
    let last = result.best_fitness();
    let improvement = match (initial, last) {
        (Some(initial), Some(last)) => ExperiencePolicy::relative_improvement(initial, last),
        _ => 0.0,
    };
    let difficulty = ExperiencePolicy::difficulty(result.dimensions, result.population_size);
    let experience_gained = if result.termination.is_success() {
        policy.experience_for(improvement, difficulty)
    } else {
        0
    };

    let now = Utc::now();
    let mut next = profile.clone();
    next.experience = next.experience.saturating_add(experience_gained);
    next.history.push(OutcomeRecord {
        job_id: result.job_id,
        algorithm: result.algorithm,
        termination: result.termination.clone(),
        initial_best: initial,
        final_best: last,
        improvement,
        difficulty,
        experience_gained,
        recorded_at: now,
    });

    let reached = level_for_experience(next.experience).max(profile.level);
    let level_ups = (profile.level..reached)
        .map(|previous| LevelUpEvent {
            agent_id: profile.agent_id.clone(),
            previous_level: previous,
            new_level: previous + 1,
            experience: next.experience,
            job_id: result.job_id,
            timestamp: now,
        })
        .collect();
    next.level = reached;

    ProgressionUpdate {
        profile: next,
        experience_gained,
        level_ups,
    }
}

/// Read-modify-write access to agent profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load a profile, `None` if the agent is unknown
    async fn load(&self, agent_id: &str) -> OptimizerResult<Option<AgentProfile>>;

    /// Persist a profile
    async fn save(&self, profile: AgentProfile) -> OptimizerResult<()>;
}

/// Process-local profile store
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<String, AgentProfile>,
}

impl InMemoryProfileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, agent_id: &str) -> OptimizerResult<Option<AgentProfile>> {
        Ok(self.profiles.get(agent_id).map(|p| p.value().clone()))
    }

    async fn save(&self, profile: AgentProfile) -> OptimizerResult<()> {
        self.profiles.insert(profile.agent_id.clone(), profile);
        Ok(())
    }
}

/// Applies job outcomes to profiles through a store, one update at a time
pub struct ProgressionTracker {
    store: Arc<dyn ProfileStore>,
    policy: ExperiencePolicy,
    update_lock: Mutex<()>,
}

impl std::fmt::Debug for ProgressionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionTracker")
            .field("policy", &self.policy)
            .finish()
    }
}

impl ProgressionTracker {
    /// Create a tracker over a store
    pub fn new(store: Arc<dyn ProfileStore>, policy: ExperiencePolicy) -> OptimizerResult<Self> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            update_lock: Mutex::new(()),
        })
    }

    /// Experience formula in use
    pub fn policy(&self) -> &ExperiencePolicy {
        &self.policy
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Load, fold and save the profile of `agent_id`
    pub async fn record(&self, agent_id: &str, result: &JobResult) -> OptimizerResult<ProgressionUpdate> {
        if !result.termination.is_terminal() {
            return Err(OptimizerError::Profile {
                message: format!("job {} is not terminal", result.job_id),
            });
        }

        let _guard = self.update_lock.lock().await;
        let profile = self
            .store
            .load(agent_id)
            .await?
            .unwrap_or_else(|| AgentProfile::new(agent_id));
        let update = record_outcome(&profile, result, &self.policy);
        self.store.save(update.profile.clone()).await?;

        for event in &update.level_ups {
            info!(
                agent_id = %event.agent_id,
                previous_level = event.previous_level,
                new_level = event.new_level,
                "agent levelled up"
            );
        }
        Ok(update)
    }
}
