//! The model abstraction boundary: everything beyond this seam is a black
//! box reached through a uniform call interface.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// Name and declared type of one variable exposed by a model instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDescriptor {
    pub name: String,
    pub value_type: ValueType,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// One externally-implemented simulation unit participating in the
/// co-simulation.
///
/// Implementations advance their own internal state in `step` and expose
/// variables through checked reads and writes. The engine never looks past
/// this interface.
pub trait ModelInstance: Send {
    /// Declared variables, in a stable order.
    fn variables(&self) -> &[VariableDescriptor];

    /// Reads the current value of a variable.
    fn read(&self, variable: &str) -> Result<Value>;

    /// Writes a variable. The value's type must match the declaration.
    fn write(&mut self, variable: &str, value: &Value) -> Result<()>;

    /// Advances internal state from `time` by `step_size`.
    fn step(&mut self, time: f64, step_size: f64) -> Result<()>;

    /// Returns the instance to its post-construction state.
    ///
    /// The default declines; models that can rewind override it.
    fn reset(&mut self) -> Result<()> {
        Err(Error::ResetUnsupported(String::new()))
    }

    /// Notifies the instance that the simulation is ending.
    fn terminate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Declared type of `variable`, if it exists.
    fn variable_type(&self, variable: &str) -> Option<ValueType> {
        self.variables()
            .iter()
            .find(|v| v.name == variable)
            .map(|v| v.value_type)
    }
}

/// A resolvable model: a factory for instances of one simulation unit.
pub trait Model: Send + Sync {
    fn instantiate(&self, instance_name: &str) -> Result<Box<dyn ModelInstance>>;
}

/// Resolves a model URI to a loadable [`Model`].
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, uri: &str) -> Option<Arc<dyn Model>>;
}

/// In-process resolver mapping URIs to natively constructed models.
///
/// Archive- or process-based resolvers live outside this crate; embedders
/// register their models here (or supply their own [`ModelResolver`]).
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `model` under `uri`, replacing any previous registration.
    pub fn register(&mut self, uri: impl Into<String>, model: Arc<dyn Model>) -> &mut Self {
        let uri = uri.into();
        debug!(uri = %uri, "registered model");
        self.models.insert(uri, model);
        self
    }
}

impl ModelResolver for ModelRegistry {
    fn resolve(&self, uri: &str) -> Option<Arc<dyn Model>> {
        self.models.get(uri).cloned()
    }
}

/// Ordered variable storage for [`ModelInstance`] implementations.
///
/// Keeps declaration order for stable listing and performs the
/// unknown-variable and type checks the instance contract requires, so a
/// model only has to supply its dynamics.
#[derive(Default)]
pub struct VariableStore {
    descriptors: Vec<VariableDescriptor>,
    values: Vec<Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable with its initial value. Redeclaring a name
    /// overwrites the stored value but keeps its position.
    pub fn declare(&mut self, name: impl Into<String>, initial: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = initial.into();
        if let Some(idx) = self.index_of(&name) {
            self.values[idx] = value;
        } else {
            self.descriptors
                .push(VariableDescriptor::new(name, value.value_type()));
            self.values.push(value);
        }
        self
    }

    pub fn descriptors(&self) -> &[VariableDescriptor] {
        &self.descriptors
    }

    pub fn read(&self, variable: &str) -> Result<Value> {
        let idx = self
            .index_of(variable)
            .ok_or_else(|| Error::UnknownVariable(variable.to_string()))?;
        Ok(self.values[idx].clone())
    }

    pub fn write(&mut self, variable: &str, value: &Value) -> Result<()> {
        let idx = self
            .index_of(variable)
            .ok_or_else(|| Error::UnknownVariable(variable.to_string()))?;
        let declared = self.descriptors[idx].value_type;
        if declared != value.value_type() {
            return Err(Error::TypeMismatch {
                identifier: variable.to_string(),
                expected: declared,
                actual: value.value_type(),
            });
        }
        self.values[idx] = value.clone();
        Ok(())
    }

    /// Typed read of a real variable, for use inside model dynamics.
    pub fn real(&self, variable: &str) -> f64 {
        self.read(variable).ok().and_then(|v| v.as_real()).unwrap_or(0.0)
    }

    /// Typed read of an integer variable, for use inside model dynamics.
    pub fn integer(&self, variable: &str) -> i32 {
        self.read(variable)
            .ok()
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }
}
