//! Instrumentation hooks invoked around each simulation step.

use crate::error::{Error, Result};
use crate::sim::engine::LiveInstance;
use crate::value::{Value, ValueType};
use crate::variable::VariableId;

/// Step metadata delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationInfo {
    pub time: f64,
    pub iteration: u64,
}

/// Read-only view of the running simulation handed to listener hooks.
///
/// Exposes the current [`SimulationInfo`] plus checked reads of any
/// declared variable, always observed at an iteration boundary.
pub struct StepContext<'a> {
    info: SimulationInfo,
    instances: &'a [LiveInstance],
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(info: SimulationInfo, instances: &'a [LiveInstance]) -> Self {
        Self { info, instances }
    }

    pub fn info(&self) -> SimulationInfo {
        self.info
    }

    pub fn time(&self) -> f64 {
        self.info.time
    }

    pub fn iteration(&self) -> u64 {
        self.info.iteration
    }

    /// Reads the current value of `identifier`.
    pub fn read(&self, identifier: &VariableId) -> Result<Value> {
        let instance = self
            .instances
            .iter()
            .find(|i| i.name == identifier.instance())
            .ok_or_else(|| Error::UnknownVariable(identifier.to_string()))?;
        instance.model.read(identifier.variable())
    }

    /// Every declared variable with its type, in instance declaration
    /// order.
    pub fn identifiers(&self) -> Vec<(VariableId, ValueType)> {
        let mut out = Vec::new();
        for instance in self.instances {
            for descriptor in instance.model.variables() {
                out.push((
                    VariableId::new(&instance.name, &descriptor.name),
                    descriptor.value_type,
                ));
            }
        }
        out
    }
}

/// Named pre-/post-step observer attached to an engine.
///
/// All hooks default to no-ops; implementors override the ones they need.
/// Errors returned from a hook surface as the failure of the engine call
/// that triggered it.
pub trait SimulationListener: Send {
    /// Called once after `init` completes, before any step.
    fn post_init(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called at the start of every iteration, before propagation.
    fn pre_step(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called at the end of every iteration, after time has advanced.
    fn post_step(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called from `terminate`, last chance to flush buffered output.
    fn post_terminate(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called from `reset`.
    fn on_reset(&mut self) -> Result<()> {
        Ok(())
    }
}

type Hook = Box<dyn FnMut(&SimulationInfo) + Send>;

/// Adapter turning plain closures into a [`SimulationListener`].
///
/// # Examples
///
/// ```
/// use cosim::CallbackListener;
///
/// let listener = CallbackListener::new()
///     .on_post_step(|info| println!("t={}", info.time));
/// # let _ = listener;
/// ```
#[derive(Default)]
pub struct CallbackListener {
    pre: Option<Hook>,
    post: Option<Hook>,
}

impl CallbackListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_step(mut self, f: impl FnMut(&SimulationInfo) + Send + 'static) -> Self {
        self.pre = Some(Box::new(f));
        self
    }

    pub fn on_post_step(mut self, f: impl FnMut(&SimulationInfo) + Send + 'static) -> Self {
        self.post = Some(Box::new(f));
        self
    }
}

impl SimulationListener for CallbackListener {
    fn pre_step(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        if let Some(f) = &mut self.pre {
            f(&ctx.info());
        }
        Ok(())
    }

    fn post_step(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        if let Some(f) = &mut self.post {
            f(&ctx.info());
        }
        Ok(())
    }
}

/// Ordered collection of named listeners; invocation follows registration
/// order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Vec<(String, Box<dyn SimulationListener>)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, name: &str, listener: Box<dyn SimulationListener>) -> Result<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(Error::DuplicateListener(name.to_string()));
        }
        self.entries.push((name.to_string(), listener));
        Ok(())
    }

    /// Removes a listener by name; absent names are a no-op.
    pub(crate) fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut Box<dyn SimulationListener>> {
        self.entries.iter_mut().map(|(_, l)| l)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
