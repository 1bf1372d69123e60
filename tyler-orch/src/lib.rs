//! Orchestration for multi-agent deployments: a named [`Registry`] of
//! agents, a [`Router`] that picks one for a thread, and the [`Runtime`]
//! ingress surface that transport adapters call.

mod registry;
mod router;
mod runtime;

pub use registry::Registry;
pub use router::{Router, extract_mentions};
pub use runtime::Runtime;
