//! Shared test models and fixtures for integration tests.
#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use cosim::{
    Error, Model, ModelInstance, ModelRegistry, Result, SimulationStructure, Value,
    VariableDescriptor, VariableStore,
};

/// Source model: `count` (int) increments, `clock` (real) accumulates step
/// size, `toggle` (bool) flips, and `phase` (string) alternates
/// `"even"`/`"odd"` each step.
pub struct Counter;

struct CounterInstance {
    vars: VariableStore,
}

fn counter_vars() -> VariableStore {
    let mut vars = VariableStore::new();
    vars.declare("count", 0)
        .declare("clock", 0.0)
        .declare("toggle", false)
        .declare("phase", "even");
    vars
}

impl ModelInstance for CounterInstance {
    fn variables(&self) -> &[VariableDescriptor] {
        self.vars.descriptors()
    }

    fn read(&self, variable: &str) -> Result<Value> {
        self.vars.read(variable)
    }

    fn write(&mut self, variable: &str, value: &Value) -> Result<()> {
        self.vars.write(variable, value)
    }

    fn step(&mut self, _time: f64, step_size: f64) -> Result<()> {
        let count = self.vars.integer("count") + 1;
        let clock = self.vars.real("clock") + step_size;
        let toggle = count % 2 == 1;
        let phase = if count % 2 == 0 { "even" } else { "odd" };
        self.vars.write("count", &Value::Integer(count))?;
        self.vars.write("clock", &Value::Real(clock))?;
        self.vars.write("toggle", &Value::Bool(toggle))?;
        self.vars.write("phase", &Value::String(phase.to_string()))
    }

    fn reset(&mut self) -> Result<()> {
        self.vars = counter_vars();
        Ok(())
    }
}

impl Model for Counter {
    fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
        Ok(Box::new(CounterInstance {
            vars: counter_vars(),
        }))
    }
}

/// Amplifier model: each step computes `y = k * u`.
pub struct Gain;

struct GainInstance {
    vars: VariableStore,
}

fn gain_vars() -> VariableStore {
    let mut vars = VariableStore::new();
    vars.declare("u", 0.0).declare("k", 1.0).declare("y", 0.0);
    vars
}

impl ModelInstance for GainInstance {
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
        let y = self.vars.real("k") * self.vars.real("u");
        self.vars.write("y", &Value::Real(y))
    }

    fn reset(&mut self) -> Result<()> {
        self.vars = gain_vars();
        Ok(())
    }
}

impl Model for Gain {
    fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
        Ok(Box::new(GainInstance { vars: gain_vars() }))
    }
}

/// Passive sink holding one variable of each type; stepping changes
/// nothing.
pub struct Holder;

struct HolderInstance {
    vars: VariableStore,
}

fn holder_vars() -> VariableStore {
    let mut vars = VariableStore::new();
    vars.declare("u", 0.0)
        .declare("n", 0)
        .declare("flag", false)
        .declare("mode", "idle");
    vars
}

impl ModelInstance for HolderInstance {
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

    fn reset(&mut self) -> Result<()> {
        self.vars = holder_vars();
        Ok(())
    }
}

impl Model for Holder {
    fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
        Ok(Box::new(HolderInstance {
            vars: holder_vars(),
        }))
    }
}

/// Model whose step call fails after a fixed number of successes.
pub struct Flaky {
    pub fail_after: u64,
}

struct FlakyInstance {
    vars: VariableStore,
    succeeded: u64,
    fail_after: u64,
}

impl ModelInstance for FlakyInstance {
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
        if self.succeeded >= self.fail_after {
            return Err(Error::InvalidConfig("forced step failure".into()));
        }
        self.succeeded += 1;
        let ticks = self.vars.integer("ticks") + 1;
        self.vars.write("ticks", &Value::Integer(ticks))
    }

    fn reset(&mut self) -> Result<()> {
        self.succeeded = 0;
        self.vars.write("ticks", &Value::Integer(0))
    }
}

impl Model for Flaky {
    fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
        let mut vars = VariableStore::new();
        vars.declare("ticks", 0);
        Ok(Box::new(FlakyInstance {
            vars,
            succeeded: 0,
            fail_after: self.fail_after,
        }))
    }
}

/// Model without reset support (keeps the trait default).
pub struct Rigid;

struct RigidInstance {
    vars: VariableStore,
}

impl ModelInstance for RigidInstance {
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

impl Model for Rigid {
    fn instantiate(&self, _name: &str) -> Result<Box<dyn ModelInstance>> {
        let mut vars = VariableStore::new();
        vars.declare("x", 0.0);
        Ok(Box::new(RigidInstance { vars }))
    }
}

/// Registry exposing every test model under a `test://` URI.
pub fn registry() -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry
        .register("test://counter", Arc::new(Counter))
        .register("test://gain", Arc::new(Gain))
        .register("test://holder", Arc::new(Holder))
        .register("test://flaky", Arc::new(Flaky { fail_after: 2 }))
        .register("test://rigid", Arc::new(Rigid));
    Arc::new(registry)
}

/// Structure with a counter source (`src`), a gain stage (`amp`), and a
/// passive sink (`hold`).
pub fn three_model_structure() -> SimulationStructure {
    let mut structure = SimulationStructure::with_resolver(registry());
    structure.add_model("src", "test://counter", None).unwrap();
    structure.add_model("amp", "test://gain", None).unwrap();
    structure.add_model("hold", "test://holder", None).unwrap();
    structure
}

/// Clonable in-memory sink for recorder assertions.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
