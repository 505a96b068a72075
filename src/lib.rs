mod acquisition;
mod adq;
#[cfg(feature = "adqapi")]
mod adqapi;
mod buffers;
mod config;
mod configurator;
mod error;
pub mod poller;
mod registry;
mod report;
pub mod retriever;
mod serializer;
mod sim;
pub mod trigger;

pub use acquisition::*;
pub use adq::*;
#[cfg(feature = "adqapi")]
pub use adqapi::*;
pub use buffers::*;
pub use config::*;
pub use configurator::*;
pub use error::*;
pub use poller::{CompletionPoller, PollState};
pub use registry::*;
pub use report::*;
pub use serializer::*;
pub use sim::*;
