//! Structural description of a co-simulation: model instances, typed
//! connections, and named parameter sets, assembled before anything runs.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Model, ModelRegistry, ModelResolver};
use crate::sim::connection::{Connection, Transform};
use crate::value::{Value, ValueType};
use crate::variable::VariableId;

/// A named, insertion-ordered collection of initial variable values,
/// selected by name at `init`.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    name: String,
    entries: Vec<(VariableId, Value)>,
}

impl ParameterSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an entry, overwriting a previous value for the same identifier
    /// while keeping its position.
    ///
    /// The variant of the stored [`Value`] follows from the native type of
    /// `value` (`bool`, `i32`, `f64`, or string).
    pub fn insert(&mut self, identifier: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let id = VariableId::parse(identifier)?;
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(eid, _)| *eid == id) {
            entry.1 = value;
        } else {
            self.entries.push((id, value));
        }
        Ok(self)
    }

    pub fn entries(&self) -> &[(VariableId, Value)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A declared model instance: resolved model plus identity and metadata.
pub(crate) struct ModelBlueprint {
    pub(crate) name: String,
    pub(crate) uri: String,
    pub(crate) step_size_hint: Option<f64>,
    pub(crate) model: Arc<dyn Model>,
}

/// Immutable blueprint of a co-simulation, built incrementally and consumed
/// by exactly one engine.
///
/// None of the builder calls touch a live model; they validate and record
/// intent. Passing the structure to
/// [`SimulationEngine::new`](crate::SimulationEngine::new) moves it, so a
/// consumed structure cannot be mutated afterwards.
pub struct SimulationStructure {
    resolver: Arc<dyn ModelResolver>,
    pub(crate) models: Vec<ModelBlueprint>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) parameter_sets: Vec<ParameterSet>,
}

impl SimulationStructure {
    /// Creates a structure with an empty in-process resolver. Useful only
    /// when models are added through a custom resolver later; most callers
    /// want [`SimulationStructure::with_resolver`].
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(ModelRegistry::new()))
    }

    /// Creates a structure resolving model URIs through `resolver`.
    pub fn with_resolver(resolver: Arc<dyn ModelResolver>) -> Self {
        Self {
            resolver,
            models: Vec::new(),
            connections: Vec::new(),
            parameter_sets: Vec::new(),
        }
    }

    /// Declares a model instance.
    ///
    /// The URI is resolved eagerly so a dangling reference fails here, not
    /// at `init`. The step-size hint is recorded metadata; the engine
    /// advances every instance by its own fixed step size regardless.
    ///
    /// # Errors
    ///
    /// Fails if `name` is already declared, `uri` does not resolve, or the
    /// hint is non-positive.
    pub fn add_model(&mut self, name: &str, uri: &str, step_size_hint: Option<f64>) -> Result<()> {
        if self.models.iter().any(|m| m.name == name) {
            return Err(Error::DuplicateInstance(name.to_string()));
        }
        if let Some(hint) = step_size_hint
            && !(hint.is_finite() && hint > 0.0)
        {
            return Err(Error::InvalidStepSize(hint));
        }
        let model = self
            .resolver
            .resolve(uri)
            .ok_or_else(|| Error::UnresolvedModel(uri.to_string()))?;

        debug!(name, uri, "declared model instance");
        self.models.push(ModelBlueprint {
            name: name.to_string(),
            uri: uri.to_string(),
            step_size_hint,
            model,
        });
        Ok(())
    }

    /// Registers a parameter set, replacing a previous set with the same
    /// name.
    pub fn add_parameter_set(&mut self, set: ParameterSet) {
        if let Some(existing) = self
            .parameter_sets
            .iter_mut()
            .find(|s| s.name() == set.name())
        {
            *existing = set;
        } else {
            self.parameter_sets.push(set);
        }
    }

    /// Connects a real source variable to a real sink, optionally passing
    /// each propagated value through `transform`.
    pub fn make_real_connection(
        &mut self,
        source: &str,
        sink: &str,
        transform: Option<Transform>,
    ) -> Result<()> {
        self.make_connection(source, sink, ValueType::Real, transform)
    }

    /// Connects an integer source variable to an integer sink.
    pub fn make_int_connection(&mut self, source: &str, sink: &str) -> Result<()> {
        self.make_connection(source, sink, ValueType::Integer, None)
    }

    /// Connects a boolean source variable to a boolean sink.
    pub fn make_bool_connection(&mut self, source: &str, sink: &str) -> Result<()> {
        self.make_connection(source, sink, ValueType::Bool, None)
    }

    /// Connects a string source variable to a string sink.
    pub fn make_string_connection(&mut self, source: &str, sink: &str) -> Result<()> {
        self.make_connection(source, sink, ValueType::String, None)
    }

    fn make_connection(
        &mut self,
        source: &str,
        sink: &str,
        value_type: ValueType,
        transform: Option<Transform>,
    ) -> Result<()> {
        let source = VariableId::parse(source)?;
        let sink = VariableId::parse(sink)?;

        for endpoint in [&source, &sink] {
            if !self.models.iter().any(|m| m.name == endpoint.instance()) {
                return Err(Error::UndeclaredInstance(endpoint.to_string()));
            }
        }
        // Single-writer invariant: each sink is driven by at most one
        // connection.
        if self.connections.iter().any(|c| *c.sink() == sink) {
            return Err(Error::DuplicateSink(sink.to_string()));
        }

        self.connections
            .push(Connection::new(source, sink, value_type, transform));
        Ok(())
    }

    /// Names of the declared model instances, in declaration order.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }
}

impl Default for SimulationStructure {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelInstance, VariableDescriptor, VariableStore};

    struct Passthrough;

    struct PassthroughInstance {
        vars: VariableStore,
    }

    impl ModelInstance for PassthroughInstance {
        fn variables(&self) -> &[VariableDescriptor] {
            self.vars.descriptors()
        }
        fn read(&self, variable: &str) -> Result<Value> {
            self.vars.read(variable)
        }
        fn write(&mut self, variable: &str, value: &Value) -> Result<()> {
            self.vars.write(variable, value)
        }
        fn step(&mut self, _time: f64, _step_size: f64) -> Result<()> {
            Ok(())
        }
    }

    impl Model for Passthrough {
        fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
            let mut vars = VariableStore::new();
            vars.declare("u", 0.0).declare("y", 0.0);
            Ok(Box::new(PassthroughInstance { vars }))
        }
    }

    fn structure_with_two_models() -> SimulationStructure {
        let mut registry = ModelRegistry::new();
        registry.register("test://passthrough", Arc::new(Passthrough));
        let mut structure = SimulationStructure::with_resolver(Arc::new(registry));
        structure
            .add_model("a", "test://passthrough", None)
            .unwrap();
        structure
            .add_model("b", "test://passthrough", Some(0.1))
            .unwrap();
        structure
    }

    #[test]
    fn duplicate_model_name_is_rejected() {
        let mut structure = structure_with_two_models();
        let err = structure
            .add_model("a", "test://passthrough", None)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateInstance(_)));
    }

    #[test]
    fn unresolvable_uri_is_rejected() {
        let mut structure = structure_with_two_models();
        let err = structure
            .add_model("c", "test://missing", None)
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedModel(_)));
    }

    #[test]
    fn connection_to_undeclared_instance_is_rejected() {
        let mut structure = structure_with_two_models();
        let err = structure
            .make_real_connection("a::y", "ghost::u", None)
            .unwrap_err();
        assert!(matches!(err, Error::UndeclaredInstance(_)));
    }

    #[test]
    fn second_connection_to_same_sink_is_rejected() {
        let mut structure = structure_with_two_models();
        structure
            .make_real_connection("a::y", "b::u", None)
            .unwrap();
        let err = structure
            .make_real_connection("b::y", "b::u", None)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSink(_)));
    }

    #[test]
    fn parameter_set_insert_overwrites_in_place() {
        let mut set = ParameterSet::new("initial");
        set.insert("a::u", 1.0).unwrap();
        set.insert("a::y", 2.0).unwrap();
        set.insert("a::u", 3.0).unwrap();

        let entries: Vec<(String, &Value)> = set
            .entries()
            .iter()
            .map(|(id, v)| (id.to_string(), v))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "a::u");
        assert_eq!(entries[0].1, &Value::Real(3.0));
    }

    #[test]
    fn add_parameter_set_replaces_by_name() {
        let mut structure = structure_with_two_models();
        let mut first = ParameterSet::new("initial");
        first.insert("a::u", 1.0).unwrap();
        structure.add_parameter_set(first);

        let mut second = ParameterSet::new("initial");
        second.insert("a::u", 9.0).unwrap();
        structure.add_parameter_set(second);

        assert_eq!(structure.parameter_sets.len(), 1);
        assert_eq!(
            structure.parameter_sets[0].entries()[0].1,
            Value::Real(9.0)
        );
    }
}
