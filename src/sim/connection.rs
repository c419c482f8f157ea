//! Typed data links between model variables.

use crate::value::{Value, ValueType};
use crate::variable::VariableId;

/// Scalar transform applied to propagated values on real connections.
pub type Transform = Box<dyn Fn(f64) -> f64 + Send>;

/// A directed, typed edge: each step, the source variable's value is
/// sampled and written to the sink.
///
/// Only real connections may carry a transform; the typed constructors on
/// [`SimulationStructure`](crate::SimulationStructure) make any other
/// combination unrepresentable.
pub struct Connection {
    source: VariableId,
    sink: VariableId,
    value_type: ValueType,
    transform: Option<Transform>,
}

impl Connection {
    pub(crate) fn new(
        source: VariableId,
        sink: VariableId,
        value_type: ValueType,
        transform: Option<Transform>,
    ) -> Self {
        Self {
            source,
            sink,
            value_type,
            transform,
        }
    }

    pub fn source(&self) -> &VariableId {
        &self.source
    }

    pub fn sink(&self) -> &VariableId {
        &self.sink
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Runs the sampled source value through the transform, if any.
    pub(crate) fn apply_transform(&self, value: Value) -> Value {
        match (&self.transform, value) {
            (Some(f), Value::Real(v)) => Value::Real(f(v)),
            (_, v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_applies_to_real_values_once() {
        let connection = Connection::new(
            VariableId::new("a", "y"),
            VariableId::new("b", "u"),
            ValueType::Real,
            Some(Box::new(|v| 2.0 * v + 1.0)),
        );
        assert_eq!(
            connection.apply_transform(Value::Real(3.0)),
            Value::Real(7.0)
        );
    }

    #[test]
    fn untransformed_values_pass_through() {
        let connection = Connection::new(
            VariableId::new("a", "n"),
            VariableId::new("b", "n"),
            ValueType::Integer,
            None,
        );
        assert_eq!(
            connection.apply_transform(Value::Integer(4)),
            Value::Integer(4)
        );
    }
}
