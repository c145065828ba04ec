//! The snowdag transitive engine.
//!
//! Vertices batch transitions into the DAG. The engine schedules each
//! received vertex for issuance, waiting on missing vertex ancestors and
//! missing transition dependencies, enforcing epoch policy, and driving
//! polls against sampled validators. Decided transactions flow out through
//! the consensus graph's collaborator callbacks.

pub mod context;
pub mod issuer;
pub mod polls;
pub mod sender;
pub mod transitive;
pub mod validators;
pub mod vertex;

mod error;

pub use context::{ChainContext, Clock, ManualClock, SystemClock};
pub use error::{EngineError, Result};
pub use sender::Sender;
pub use transitive::{DagVertex, Transitive, VertexBuilder};
pub use validators::{Validator, ValidatorSet, Validators};
pub use vertex::Vertex;
