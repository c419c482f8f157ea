//! Fixed-step co-simulation core.
//!
//! Couples independently-executing model instances into one
//! time-synchronized run: a [`SimulationStructure`] describes instances,
//! typed connections, and named parameter sets; a [`SimulationEngine`]
//! realizes the structure and advances all instances in lock-step while
//! propagating connection values, scenario actions, and listener
//! notifications; a [`SimulationRunner`] drives the engine from a
//! background thread at a configurable real-time factor.

pub mod error;
pub mod model;
pub mod runner;
/// Timed external stimuli.
pub mod scenario;
/// Engine, connections, listeners, and recording.
pub mod sim;
pub mod structure;
pub mod value;
pub mod variable;

pub use error::{Error, ErrorKind, Result};
pub use model::{
    Model, ModelInstance, ModelRegistry, ModelResolver, VariableDescriptor, VariableStore,
};
pub use runner::SimulationRunner;
pub use scenario::{ScenarioAction, ScenarioPlayer};
pub use sim::connection::{Connection, Transform};
pub use sim::engine::{Lifecycle, SimulationEngine};
pub use sim::listener::{CallbackListener, SimulationInfo, SimulationListener, StepContext};
pub use sim::recorder::{CsvRecorder, RecorderConfig};
pub use structure::{ParameterSet, SimulationStructure};
pub use value::{Value, ValueType};
pub use variable::VariableId;
