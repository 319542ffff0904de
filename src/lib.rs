//! # Policy Optimizer
//!
//! An LLM-driven policy optimization experiment framework: given a YAML
//! experiment definition, repeatedly proposes candidate decision policies
//! via a large language model, evaluates them against a deterministic
//! payment-system simulator, and accepts or rejects each proposal using
//! statistically valid paired comparison.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use policy_optimizer::config::ExperimentConfig;
//! use policy_optimizer::llm::HttpLlmClient;
//! use policy_optimizer::optimize::OptimizationLoop;
//! use policy_optimizer::persistence::LiveStateProvider;
//! use policy_optimizer::record::ExperimentRecord;
//! use policy_optimizer::simulator::ProcessSimulator;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> policy_optimizer::Result<()> {
//!     let config = ExperimentConfig::load("experiment.yaml")?;
//!     let constraints = config.get_constraints()?;
//!     let simulator = ProcessSimulator::new("simulator", &config.scenario);
//!     let llm = HttpLlmClient::new(config.llm.clone(), "key".to_string(), config.get_system_prompt()?)?;
//!
//!     let pool = policy_optimizer::persistence::live::connect(&config.output_directory().join("experiment.db")).await?;
//!     let record = ExperimentRecord::start(policy_optimizer::domain::RunId::new(), &config.name, config.config_snapshot()?);
//!     let state = LiveStateProvider::start(pool, &record).await?;
//!
//!     let mut loop_ = OptimizationLoop::new(&config, constraints, &simulator, llm, &state, HashMap::new());
//!     loop_.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module map
//!
//! - [`config`] — experiment YAML loading and validation.
//! - [`constraints`] — the parameter/action whitelist a proposal must satisfy.
//! - [`domain`] — money, run identifiers, and timestamps shared everywhere.
//! - [`sampling`] — deterministic seed derivation for bootstrap samples.
//! - [`simulator`] — the external simulator contract and its process adapter.
//! - [`evaluator`] — paired baseline/proposal evaluation over shared samples.
//! - [`context`] — builds the per-agent context handed to the LLM.
//! - [`llm`] — the LLM client contract, audit capture, and HTTP backend.
//! - [`policy`] — parsing and constraint-checking proposed decision trees.
//! - [`convergence`] — the stopping criteria for an optimization run.
//! - [`record`] — the data shapes persisted for every run, iteration, and event.
//! - [`persistence`] — the live/replay state provider over a SQLite store.
//! - [`telemetry`] — point-in-time counters for the run's own observability.
//! - [`optimize`] — the loop that ties every module above together.
//! - [`error`] — the crate-wide error taxonomy.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod constraints;
pub mod context;
pub mod convergence;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod llm;
pub mod optimize;
pub mod persistence;
pub mod policy;
pub mod record;
pub mod sampling;
pub mod simulator;
pub mod telemetry;

pub use config::ExperimentConfig;
pub use error::{Error, Result};
pub use optimize::OptimizationLoop;
pub use policy::Policy;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
