pub mod config;
pub mod error;
mod bridge;
mod egress;
mod ingress;

#[cfg(test)]
mod testing;

pub use error::PipelineError;
pub use bridge::{Bridge, Pipeline, PipelineHandle, PipelineKind};
pub use egress::{DiscoveredFile, EgressWatcher, TickReport};
pub use ingress::{AssemblyKey, FlushReport, IngressAssembler, IngressPipeline};
