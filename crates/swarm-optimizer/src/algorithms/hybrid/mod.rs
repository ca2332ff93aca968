//! DE/PSO hybrid combining both update rules within one population
//!
//! `Split` runs DE on the leading slots and PSO on the rest every
//! generation, then lets the two subpopulations exchange their best members.
//! `Alternate` applies DE to the whole population on even generations and
//! PSO on odd ones.

mod config;
mod system;


pub use config::{DepsoConfig, HybridMode};
pub use system::DepsoOptimizer;
