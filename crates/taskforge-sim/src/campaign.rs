//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with shared parameters, collecting pass/fail results
//! and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub device_count: usize,
    pub user_count: usize,
    pub steps: u64,
    pub commit_fault_percent: u8,
    pub legacy_write_percent: u8,
    pub fold_repairs: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            device_count: sim.device_count,
            user_count: sim.user_count,
            steps: sim.steps,
            commit_fault_percent: sim.commit_fault_percent,
            legacy_write_percent: sim.legacy_write_percent,
            fold_repairs: sim.fold_repairs,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            device_count: self.device_count,
            user_count: self.user_count,
            steps: self.steps,
            commit_fault_percent: self.commit_fault_percent,
            legacy_write_percent: self.legacy_write_percent,
            fold_repairs: self.fold_repairs,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the seed range is empty or the per-seed
    /// parameters are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds in which a deletion needed repairs or hit an injected failure.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every seed in `config.seed_range`.
///
/// # Errors
///
/// Returns an error if config validation fails.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        let result = replay_seed(seed, config)?;
        report.seeds_run += 1;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if result.passed() {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = result.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result
                    .violations
                    .iter()
                    .map(|v| format!("step {}: {}", v.step, v.violation))
                    .collect(),
            });
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        "campaign complete"
    );
    Ok(report)
}

/// Run one seed with the campaign's parameters and return the full result.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    Simulator::new(config.sim_config_for_seed(seed))?.run()
}
