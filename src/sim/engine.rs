//! The stepping core: advances all model instances in lock-step while
//! propagating connection values, scenario actions, and listener
//! notifications.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::ModelInstance;
use crate::scenario::ScenarioPlayer;
use crate::sim::connection::Connection;
use crate::sim::listener::{ListenerRegistry, SimulationInfo, SimulationListener, StepContext};
use crate::structure::{ModelBlueprint, ParameterSet, SimulationStructure};
use crate::value::{Value, ValueType};
use crate::variable::VariableId;

/// Engine lifecycle states. Transitions other than
/// `Built → Initialized → Terminated → Destroyed` (with `reset` returning
/// to `Built`) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Built,
    Initialized,
    Terminated,
    Destroyed,
}

impl Lifecycle {
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Built => "built",
            Lifecycle::Initialized => "initialized",
            Lifecycle::Terminated => "terminated",
            Lifecycle::Destroyed => "destroyed",
        }
    }
}

/// A realized model instance: the live black box plus its declared name.
pub(crate) struct LiveInstance {
    pub(crate) name: String,
    pub(crate) model: Box<dyn ModelInstance>,
}

/// Fixed-step co-simulation engine.
///
/// Owns a realized [`SimulationStructure`] and advances simulation time in
/// fixed increments. Each iteration runs pre-listeners, connection
/// propagation, model stepping, the time/iteration advance, due scenario
/// actions, and post-listeners, in that order.
///
/// Connection propagation samples every source before writing any sink, so
/// cross-model coupling within a step always uses previous-step output
/// values (first-order lag semantics, independent of connection order).
pub struct SimulationEngine {
    step_size: f64,
    time: f64,
    iteration: u64,
    lifecycle: Lifecycle,
    blueprints: Vec<ModelBlueprint>,
    parameter_sets: Vec<ParameterSet>,
    connections: Vec<Connection>,
    instances: Vec<LiveInstance>,
    listeners: ListenerRegistry,
    scenario: Option<ScenarioPlayer>,
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("step_size", &self.step_size)
            .field("time", &self.time)
            .field("iteration", &self.iteration)
            .field("lifecycle", &self.lifecycle)
            .field("num_instances", &self.instances.len())
            .field("num_connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl SimulationEngine {
    /// Consumes a structure, fixing the macro step size.
    ///
    /// # Errors
    ///
    /// Fails if `step_size` is not positive and finite.
    pub fn new(structure: SimulationStructure, step_size: f64) -> Result<Self> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(Error::InvalidStepSize(step_size));
        }
        Ok(Self {
            step_size,
            time: 0.0,
            iteration: 0,
            lifecycle: Lifecycle::Built,
            blueprints: structure.models,
            parameter_sets: structure.parameter_sets,
            connections: structure.connections,
            instances: Vec::new(),
            listeners: ListenerRegistry::default(),
            scenario: None,
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Declared instance names, in declaration order.
    pub fn instance_names(&self) -> Vec<&str> {
        self.blueprints.iter().map(|b| b.name.as_str()).collect()
    }

    /// URI a declared instance was resolved from.
    pub fn model_uri(&self, instance: &str) -> Option<&str> {
        self.blueprints
            .iter()
            .find(|b| b.name == instance)
            .map(|b| b.uri.as_str())
    }

    /// Step-size hint recorded for a declared instance. Informational
    /// only; every instance advances by the engine step size.
    pub fn step_size_hint(&self, instance: &str) -> Option<f64> {
        self.blueprints
            .iter()
            .find(|b| b.name == instance)
            .and_then(|b| b.step_size_hint)
    }

    /// Every variable of every live instance. Empty before `init`.
    pub fn identifiers(&self) -> Vec<VariableId> {
        self.instances
            .iter()
            .flat_map(|i| {
                i.model
                    .variables()
                    .iter()
                    .map(|d| VariableId::new(&i.name, &d.name))
            })
            .collect()
    }

    /// Registers a named listener.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name, or once stepping has begun.
    pub fn add_listener(
        &mut self,
        name: &str,
        listener: Box<dyn SimulationListener>,
    ) -> Result<()> {
        self.require_attachable("add listener")?;
        self.listeners.add(name, listener)
    }

    /// Removes a listener by name; absent names are a no-op.
    pub fn remove_listener(&mut self, name: &str) {
        self.listeners.remove(name);
    }

    /// Attaches the scenario to play during stepping, replacing any
    /// previous one.
    pub fn set_scenario(&mut self, player: ScenarioPlayer) -> Result<()> {
        self.require_attachable("attach scenario")?;
        self.scenario = Some(player);
        Ok(())
    }

    /// Resolves every declared model to a live instance, validates the
    /// connection graph and the selected parameter set against them,
    /// applies the parameters, and transitions to `Initialized`.
    ///
    /// On any failure the engine keeps its `Built` state with no live
    /// instances left behind.
    pub fn init(&mut self, start_time: Option<f64>, parameter_set: Option<&str>) -> Result<()> {
        if self.lifecycle != Lifecycle::Built {
            return Err(Error::InvalidState {
                operation: "init",
                state: self.lifecycle.name(),
            });
        }
        let start = start_time.unwrap_or(0.0);
        if !(start.is_finite() && start >= 0.0) {
            return Err(Error::InvalidStartTime(start));
        }
        let selected = match parameter_set {
            Some(name) => Some(
                self.parameter_sets
                    .iter()
                    .find(|s| s.name() == name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownParameterSet(name.to_string()))?,
            ),
            None => None,
        };

        debug!(start, "initializing simulation");

        // Instances survive a reset; only instantiate from a cold start.
        let fresh = self.instances.is_empty();
        if fresh {
            let mut instances = Vec::with_capacity(self.blueprints.len());
            for blueprint in &self.blueprints {
                let model = blueprint
                    .model
                    .instantiate(&blueprint.name)
                    .map_err(|err| Error::ModelFailure {
                        instance: blueprint.name.clone(),
                        operation: "instantiate",
                        message: err.to_string(),
                    })?;
                instances.push(LiveInstance {
                    name: blueprint.name.clone(),
                    model,
                });
            }
            self.instances = instances;
        }

        if let Err(err) = self.realize(selected.as_ref()) {
            if fresh {
                self.instances.clear();
            }
            return Err(err);
        }

        self.time = start;
        self.iteration = 0;
        self.lifecycle = Lifecycle::Initialized;

        let info = SimulationInfo {
            time: self.time,
            iteration: self.iteration,
        };
        notify(&mut self.listeners, &self.instances, info, Hook::PostInit)?;

        debug!("initialized");
        Ok(())
    }

    /// Validates connections and the selected parameter set against the
    /// live instances, then applies the parameter entries.
    fn realize(&mut self, selected: Option<&ParameterSet>) -> Result<()> {
        for connection in &self.connections {
            for endpoint in [connection.source(), connection.sink()] {
                let declared = declared_type(&self.instances, endpoint)?;
                if declared != connection.value_type() {
                    return Err(Error::TypeMismatch {
                        identifier: endpoint.to_string(),
                        expected: connection.value_type(),
                        actual: declared,
                    });
                }
            }
        }
        if let Some(set) = selected {
            for (id, value) in set.entries() {
                let declared = declared_type(&self.instances, id)?;
                if declared != value.value_type() {
                    return Err(Error::TypeMismatch {
                        identifier: id.to_string(),
                        expected: declared,
                        actual: value.value_type(),
                    });
                }
            }
            for (id, value) in set.entries() {
                write_variable(&mut self.instances, id, value)?;
            }
            debug!(
                set = set.name(),
                entries = set.entries().len(),
                "applied parameter set"
            );
        }
        Ok(())
    }

    /// Advances the simulation by `num_steps` iterations and returns the
    /// new time.
    ///
    /// A failing model step aborts the current iteration before time and
    /// iteration advance; already-applied connection writes and listener
    /// notifications from earlier sub-phases of that iteration are not
    /// rolled back.
    pub fn step(&mut self, num_steps: u64) -> Result<f64> {
        self.require_initialized("step")?;

        for _ in 0..num_steps {
            let info = SimulationInfo {
                time: self.time,
                iteration: self.iteration,
            };
            notify(&mut self.listeners, &self.instances, info, Hook::PreStep)?;

            // Sample every source before writing any sink so chained
            // connections also observe previous-step values.
            let mut staged = Vec::with_capacity(self.connections.len());
            for connection in &self.connections {
                let value = read_variable(&self.instances, connection.source())?;
                staged.push((connection.sink(), connection.apply_transform(value)));
            }
            for (sink, value) in staged {
                write_variable(&mut self.instances, sink, &value)?;
            }

            for instance in &mut self.instances {
                instance
                    .model
                    .step(self.time, self.step_size)
                    .map_err(|err| Error::ModelFailure {
                        instance: instance.name.clone(),
                        operation: "step",
                        message: err.to_string(),
                    })?;
            }

            self.time += self.step_size;
            self.iteration += 1;

            if let Some(player) = &mut self.scenario {
                for action in player.advance_to(self.time) {
                    debug!(
                        time = self.time,
                        identifier = %action.identifier(),
                        "applying scenario action"
                    );
                    write_variable(&mut self.instances, action.identifier(), action.value())?;
                }
            }

            let info = SimulationInfo {
                time: self.time,
                iteration: self.iteration,
            };
            notify(&mut self.listeners, &self.instances, info, Hook::PostStep)?;
        }

        Ok(self.time)
    }

    /// Steps until just before `time_point` is exceeded.
    ///
    /// Only an integral number of full steps is taken; a fractional
    /// remainder is truncated, not rounded up.
    pub fn step_until(&mut self, time_point: f64) -> Result<f64> {
        self.require_initialized("step")?;
        let span = time_point - self.time;
        // Tolerate representation error so a span of exactly k steps is not
        // truncated to k - 1.
        let steps = if span > 0.0 {
            ((span / self.step_size) + 1e-9).floor() as u64
        } else {
            0
        };
        if steps == 0 {
            warn!(
                time_point,
                current = self.time,
                "no full step fits before the requested time point"
            );
            return Ok(self.time);
        }
        self.step(steps)
    }

    /// Steps for approximately `duration`, truncating any fractional
    /// remainder.
    pub fn step_for(&mut self, duration: f64) -> Result<f64> {
        self.require_initialized("step")?;
        self.step_until(self.time + duration)
    }

    pub fn get_int(&self, identifier: &str) -> Result<i32> {
        match self.read_typed(identifier, ValueType::Integer)? {
            Value::Integer(v) => Ok(v),
            value => Err(type_mismatch(identifier, ValueType::Integer, &value)),
        }
    }

    pub fn get_real(&self, identifier: &str) -> Result<f64> {
        match self.read_typed(identifier, ValueType::Real)? {
            Value::Real(v) => Ok(v),
            value => Err(type_mismatch(identifier, ValueType::Real, &value)),
        }
    }

    pub fn get_bool(&self, identifier: &str) -> Result<bool> {
        match self.read_typed(identifier, ValueType::Bool)? {
            Value::Bool(v) => Ok(v),
            value => Err(type_mismatch(identifier, ValueType::Bool, &value)),
        }
    }

    pub fn get_string(&self, identifier: &str) -> Result<String> {
        match self.read_typed(identifier, ValueType::String)? {
            Value::String(v) => Ok(v),
            value => Err(type_mismatch(identifier, ValueType::String, &value)),
        }
    }

    pub fn set_int(&mut self, identifier: &str, value: i32) -> Result<()> {
        self.write_typed(identifier, Value::Integer(value))
    }

    pub fn set_real(&mut self, identifier: &str, value: f64) -> Result<()> {
        self.write_typed(identifier, Value::Real(value))
    }

    pub fn set_bool(&mut self, identifier: &str, value: bool) -> Result<()> {
        self.write_typed(identifier, Value::Bool(value))
    }

    pub fn set_string(&mut self, identifier: &str, value: &str) -> Result<()> {
        self.write_typed(identifier, Value::String(value.to_string()))
    }

    /// Returns every instance to its post-construction state, rewinds the
    /// scenario cursor, and zeroes time and iteration. The engine drops
    /// back to `Built` and is eligible for a fresh `init`.
    pub fn reset(&mut self) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Built | Lifecycle::Initialized) {
            return Err(Error::InvalidState {
                operation: "reset",
                state: self.lifecycle.name(),
            });
        }
        debug!(time = self.time, "resetting simulation");
        for instance in &mut self.instances {
            instance.model.reset().map_err(|err| match err {
                Error::ResetUnsupported(_) => Error::ResetUnsupported(instance.name.clone()),
                other => Error::ModelFailure {
                    instance: instance.name.clone(),
                    operation: "reset",
                    message: other.to_string(),
                },
            })?;
        }
        if let Some(player) = &mut self.scenario {
            player.reset();
        }
        for listener in self.listeners.iter_mut() {
            listener.on_reset()?;
        }
        self.time = 0.0;
        self.iteration = 0;
        self.lifecycle = Lifecycle::Built;
        Ok(())
    }

    /// Notifies every instance and listener that the run is over and
    /// transitions to `Terminated`. Calling it again is a no-op.
    ///
    /// Listeners are always notified (recorders flush their output) even
    /// when an instance fails to terminate; the first failure is returned.
    pub fn terminate(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Terminated => return Ok(()),
            Lifecycle::Initialized => {}
            other => {
                return Err(Error::InvalidState {
                    operation: "terminate",
                    state: other.name(),
                });
            }
        }
        debug!("terminating simulation");
        self.lifecycle = Lifecycle::Terminated;

        let mut first_error = None;
        for instance in &mut self.instances {
            if let Err(err) = instance.model.terminate() {
                let err = Error::ModelFailure {
                    instance: instance.name.clone(),
                    operation: "terminate",
                    message: err.to_string(),
                };
                first_error.get_or_insert(err);
            }
        }

        let ctx = StepContext::new(
            SimulationInfo {
                time: self.time,
                iteration: self.iteration,
            },
            &self.instances,
        );
        for listener in self.listeners.iter_mut() {
            if let Err(err) = listener.post_terminate(&ctx) {
                first_error.get_or_insert(err);
            }
        }

        debug!("terminated");
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Releases all engine and structure resources. Idempotent; an engine
    /// still `Initialized` is terminated (best effort) first.
    pub fn destroy(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        if self.lifecycle == Lifecycle::Initialized
            && let Err(err) = self.terminate()
        {
            warn!(error = %err, "termination during destroy failed");
        }
        self.instances.clear();
        self.listeners.clear();
        self.scenario = None;
        self.blueprints.clear();
        self.connections.clear();
        self.parameter_sets.clear();
        self.lifecycle = Lifecycle::Destroyed;
    }

    fn read_typed(&self, identifier: &str, expected: ValueType) -> Result<Value> {
        self.require_initialized("get")?;
        let id = VariableId::parse(identifier)?;
        let declared = declared_type(&self.instances, &id)?;
        if declared != expected {
            return Err(Error::TypeMismatch {
                identifier: identifier.to_string(),
                expected,
                actual: declared,
            });
        }
        read_variable(&self.instances, &id)
    }

    fn write_typed(&mut self, identifier: &str, value: Value) -> Result<()> {
        self.require_initialized("set")?;
        let id = VariableId::parse(identifier)?;
        let declared = declared_type(&self.instances, &id)?;
        if declared != value.value_type() {
            return Err(Error::TypeMismatch {
                identifier: identifier.to_string(),
                expected: value.value_type(),
                actual: declared,
            });
        }
        write_variable(&mut self.instances, &id, &value)
    }

    fn require_initialized(&self, operation: &'static str) -> Result<()> {
        if self.lifecycle != Lifecycle::Initialized {
            return Err(Error::InvalidState {
                operation,
                state: self.lifecycle.name(),
            });
        }
        Ok(())
    }

    /// Listeners and scenarios may only be attached before stepping begins.
    fn require_attachable(&self, operation: &'static str) -> Result<()> {
        let state = if self.iteration > 0 {
            "stepping"
        } else {
            self.lifecycle.name()
        };
        let attachable = self.iteration == 0
            && matches!(self.lifecycle, Lifecycle::Built | Lifecycle::Initialized);
        if !attachable {
            return Err(Error::InvalidState { operation, state });
        }
        Ok(())
    }
}

enum Hook {
    PostInit,
    PreStep,
    PostStep,
}

fn notify(
    listeners: &mut ListenerRegistry,
    instances: &[LiveInstance],
    info: SimulationInfo,
    hook: Hook,
) -> Result<()> {
    let ctx = StepContext::new(info, instances);
    for listener in listeners.iter_mut() {
        match hook {
            Hook::PostInit => listener.post_init(&ctx)?,
            Hook::PreStep => listener.pre_step(&ctx)?,
            Hook::PostStep => listener.post_step(&ctx)?,
        }
    }
    Ok(())
}

fn find<'a>(instances: &'a [LiveInstance], id: &VariableId) -> Result<&'a LiveInstance> {
    instances
        .iter()
        .find(|i| i.name == id.instance())
        .ok_or_else(|| Error::UnknownVariable(id.to_string()))
}

fn declared_type(instances: &[LiveInstance], id: &VariableId) -> Result<ValueType> {
    find(instances, id)?
        .model
        .variable_type(id.variable())
        .ok_or_else(|| Error::UnknownVariable(id.to_string()))
}

fn read_variable(instances: &[LiveInstance], id: &VariableId) -> Result<Value> {
    find(instances, id)?.model.read(id.variable())
}

fn write_variable(instances: &mut [LiveInstance], id: &VariableId, value: &Value) -> Result<()> {
    let instance = instances
        .iter_mut()
        .find(|i| i.name == id.instance())
        .ok_or_else(|| Error::UnknownVariable(id.to_string()))?;
    instance.model.write(id.variable(), value)
}

fn type_mismatch(identifier: &str, expected: ValueType, value: &Value) -> Error {
    Error::TypeMismatch {
        identifier: identifier.to_string(),
        expected,
        actual: value.value_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn empty_engine(step_size: f64) -> SimulationEngine {
        SimulationEngine::new(SimulationStructure::new(), step_size).unwrap()
    }

    #[test]
    fn non_positive_step_size_is_rejected() {
        assert!(matches!(
            SimulationEngine::new(SimulationStructure::new(), 0.0).unwrap_err(),
            Error::InvalidStepSize(_)
        ));
        assert!(matches!(
            SimulationEngine::new(SimulationStructure::new(), f64::NAN).unwrap_err(),
            Error::InvalidStepSize(_)
        ));
    }

    #[test]
    fn step_before_init_fails_without_advancing_time() {
        let mut engine = empty_engine(0.1);
        let err = engine.step(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(engine.time(), 0.0);
        assert_eq!(engine.iteration(), 0);
    }

    #[test]
    fn double_init_is_a_state_error() {
        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        let err = engine.init(None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn hundred_steps_of_a_centisecond_reach_one_second() {
        let mut engine = empty_engine(0.01);
        engine.init(None, None).unwrap();
        let time = engine.step(100).unwrap();
        assert!((time - 1.0).abs() < 1e-9);
        assert_eq!(engine.iteration(), 100);

        let err = engine.get_real("missing::var").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!((engine.time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_parameter_set_fails_cleanly() {
        let mut engine = empty_engine(0.1);
        let err = engine.init(None, Some("nope")).unwrap_err();
        assert!(matches!(err, Error::UnknownParameterSet(_)));
        assert_eq!(engine.lifecycle(), Lifecycle::Built);
    }

    #[test]
    fn negative_start_time_is_rejected() {
        let mut engine = empty_engine(0.1);
        let err = engine.init(Some(-1.0), None).unwrap_err();
        assert!(matches!(err, Error::InvalidStartTime(_)));
        assert_eq!(engine.lifecycle(), Lifecycle::Built);
    }

    #[test]
    fn init_honors_explicit_start_time() {
        let mut engine = empty_engine(0.5);
        engine.init(Some(10.0), None).unwrap();
        assert_eq!(engine.time(), 10.0);
        engine.step(2).unwrap();
        assert!((engine.time() - 11.0).abs() < 1e-12);
    }

    #[test]
    fn step_until_truncates_fractional_remainders() {
        let mut engine = empty_engine(0.3);
        engine.init(None, None).unwrap();
        let time = engine.step_until(1.0).unwrap();
        assert!((time - 0.9).abs() < 1e-12);

        // The 0.1 remainder does not fit another full step.
        let time = engine.step_until(1.0).unwrap();
        assert!((time - 0.9).abs() < 1e-12);
    }

    #[test]
    fn step_for_covers_exact_multiples_without_truncation() {
        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        engine.step_for(1.0).unwrap();
        assert_eq!(engine.iteration(), 10);
    }

    #[test]
    fn terminate_is_idempotent_and_blocks_stepping() {
        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        engine.terminate().unwrap();
        engine.terminate().unwrap();
        let err = engine.step(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        engine.destroy();
        engine.destroy();
        assert_eq!(engine.lifecycle(), Lifecycle::Destroyed);
    }

    #[test]
    fn listeners_cannot_attach_once_stepping_began() {
        use crate::sim::listener::CallbackListener;

        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        engine
            .add_listener("early", Box::new(CallbackListener::new()))
            .unwrap();
        engine.step(1).unwrap();
        let err = engine
            .add_listener("late", Box::new(CallbackListener::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn reset_returns_the_engine_to_built() {
        let mut engine = empty_engine(0.1);
        engine.init(None, None).unwrap();
        engine.step(3).unwrap();
        engine.reset().unwrap();
        assert_eq!(engine.lifecycle(), Lifecycle::Built);
        assert_eq!(engine.time(), 0.0);
        assert_eq!(engine.iteration(), 0);
        engine.init(None, None).unwrap();
    }
}
