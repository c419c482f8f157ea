//! Timed external stimuli, applied automatically as simulation time
//! advances.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::variable::VariableId;

/// One timed set-action: at `time`, write `value` to `identifier`.
#[derive(Debug, Clone)]
pub struct ScenarioAction {
    time: f64,
    identifier: VariableId,
    value: Value,
}

impl ScenarioAction {
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn identifier(&self) -> &VariableId {
        &self.identifier
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// An ordered timeline of [`ScenarioAction`]s, consumed monotonically as
/// the owning engine advances time.
///
/// Actions are kept sorted ascending by time with ties in insertion order.
/// Once an action's time has been passed it is applied exactly once; only a
/// [`reset`](ScenarioPlayer::reset) rewinds the cursor.
///
/// # Examples
///
/// ```
/// use cosim::ScenarioPlayer;
///
/// let mut player = ScenarioPlayer::new();
/// player.add_real_action(2.5, "pump::rpm", 1200.0).unwrap();
/// player.add_bool_action(1.0, "valve::open", true).unwrap();
/// assert_eq!(player.len(), 2);
/// ```
#[derive(Default, Debug)]
pub struct ScenarioPlayer {
    actions: Vec<ScenarioAction>,
    cursor: usize,
}

impl ScenarioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action at `time` for `identifier`.
    ///
    /// # Errors
    ///
    /// Fails if `time` is negative or not finite, or if the identifier is
    /// malformed.
    pub fn add_action(&mut self, time: f64, identifier: &str, value: impl Into<Value>) -> Result<()> {
        if !(time.is_finite() && time >= 0.0) {
            return Err(Error::InvalidActionTime(time));
        }
        let identifier = VariableId::parse(identifier)?;
        // Insert after every action with time <= this one, keeping ties in
        // insertion order.
        let position = self.actions.partition_point(|a| a.time <= time);
        self.actions.insert(
            position,
            ScenarioAction {
                time,
                identifier,
                value: value.into(),
            },
        );
        Ok(())
    }

    pub fn add_real_action(&mut self, time: f64, identifier: &str, value: f64) -> Result<()> {
        self.add_action(time, identifier, value)
    }

    pub fn add_int_action(&mut self, time: f64, identifier: &str, value: i32) -> Result<()> {
        self.add_action(time, identifier, value)
    }

    pub fn add_bool_action(&mut self, time: f64, identifier: &str, value: bool) -> Result<()> {
        self.add_action(time, identifier, value)
    }

    /// Loads a scenario from a TOML file of `[[action]]` tables.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parses a scenario from TOML text.
    ///
    /// Each `[[action]]` table carries `time`, `variable`, and `value`;
    /// the value's TOML type selects the [`Value`] variant.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ScenarioFile = toml::from_str(raw)
            .map_err(|err| Error::InvalidConfig(format!("invalid scenario file: {err}")))?;

        let mut player = Self::new();
        for action in &file.actions {
            let value = Value::from_toml(&action.value)?;
            player.add_action(action.time, &action.variable, value)?;
        }
        debug!(actions = player.len(), "loaded scenario");
        Ok(player)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions not yet applied.
    pub fn remaining(&self) -> usize {
        self.actions.len() - self.cursor
    }

    /// Rewinds the cursor so every action becomes applicable again.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Advances the cursor past every action with `time <= now` and returns
    /// the newly passed actions in order.
    pub(crate) fn advance_to(&mut self, now: f64) -> &[ScenarioAction] {
        let start = self.cursor;
        while self.cursor < self.actions.len() && self.actions[self.cursor].time <= now {
            self.cursor += 1;
        }
        &self.actions[start..self.cursor]
    }
}

#[derive(Deserialize)]
struct ScenarioFile {
    #[serde(rename = "action", default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    time: f64,
    variable: String,
    value: toml::Value,
}
