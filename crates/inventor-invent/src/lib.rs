//! Inventor Invent - the three-stage invention pipeline and its adapters
//!
//! `Inventor` drives the agent through the step catalogue for one function,
//! stages and publishes it, then recursively invents its placeholders.

pub mod config;
pub mod events;
pub mod host;
pub mod names;
pub mod orchestrator;
pub mod pool;
pub mod publish;
pub mod quality;
pub mod resolve;
pub mod staging;
pub mod steps;
pub mod vcs;

pub use config::{InventConfig, Secrets};
pub use events::{read_events, EventFileSink};
pub use host::{GitHubHost, Host};
pub use orchestrator::{InventRequest, Invented, Inventor, InventorOptions};
pub use quality::{read_quality_function, QualityFunction};
pub use staging::StagingStore;
pub use steps::StepKind;
pub use vcs::{GitAuthor, GitCli, Vcs};
