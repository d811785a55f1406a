//! Parameter binding
//!
//! Resolves the parameters supplied with a statement into the slot-ordered
//! values read by `?` and `:name` placeholders during evaluation.

use crate::adapter::{AdapterRegistry, Params};
use crate::error::{Error, Result};
use crate::sql::ParameterSpec;
use crate::storage::Value;

/// Bind `params` against the placeholders a statement declares
pub fn bind_parameters(
    spec: &ParameterSpec,
    params: &Params,
    adapters: &AdapterRegistry,
) -> Result<Vec<Value>> {
    match (spec, params) {
        // A statement without placeholders ignores an empty list or any map
        (ParameterSpec::None, Params::None) | (ParameterSpec::None, Params::Named(_)) => {
            Ok(Vec::new())
        }
        (ParameterSpec::None, Params::Positional(values)) if values.is_empty() => Ok(Vec::new()),
        (ParameterSpec::None, Params::Positional(values)) => Err(count_mismatch(0, values.len())),

        (ParameterSpec::Positional(expected), Params::None) => Err(count_mismatch(*expected, 0)),
        (ParameterSpec::Positional(expected), Params::Positional(values)) => {
            if values.len() != *expected {
                return Err(count_mismatch(*expected, values.len()));
            }
            values.iter().map(|param| param.resolve(adapters)).collect()
        }
        (ParameterSpec::Positional(_), Params::Named(_)) => Err(Error::ParameterCount(
            "Binding 1 has no name, but you supplied a dictionary (which has only names)."
                .to_string(),
        )),

        (ParameterSpec::Named(names), Params::Named(values)) => names
            .iter()
            .map(|name| {
                values
                    .get(name.as_str())
                    .ok_or_else(|| {
                        Error::ParameterCount(format!(
                            "You did not supply a value for binding parameter :{}.",
                            name
                        ))
                    })?
                    .resolve(adapters)
            })
            .collect(),
        (ParameterSpec::Named(names), _) => Err(Error::ParameterCount(format!(
            "Binding :{} is named, but parameters were not supplied as a mapping.",
            names.first().map(String::as_str).unwrap_or_default()
        ))),
    }
}

fn count_mismatch(expected: usize, supplied: usize) -> Error {
    Error::ParameterCount(format!(
        "Incorrect number of bindings supplied. The current statement uses {}, and there are {} supplied.",
        expected, supplied
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{named_params, params, Param};

    #[test]
    fn test_positional_binding() {
        let adapters = AdapterRegistry::new();
        let values = bind_parameters(
            &ParameterSpec::Positional(2),
            &params![1, "two"],
            &adapters,
        )
        .unwrap();
        assert_eq!(values, vec![Value::Integer(1), Value::Text("two".into())]);

        let err = bind_parameters(&ParameterSpec::Positional(2), &params![1], &adapters);
        assert!(matches!(err, Err(Error::ParameterCount(_))));
    }

    #[test]
    fn test_named_binding_follows_slots() {
        let adapters = AdapterRegistry::new();
        let spec = ParameterSpec::Named(vec!["b".into(), "a".into()]);
        let values =
            bind_parameters(&spec, &named_params! { "a" => 1, "b" => 2, "c" => 3 }, &adapters)
                .unwrap();
        assert_eq!(values, vec![Value::Integer(2), Value::Integer(1)]);

        let err = bind_parameters(&spec, &named_params! { "a" => 1 }, &adapters).unwrap_err();
        assert!(err.to_string().contains(":b"));
    }

    #[test]
    fn test_style_mismatch() {
        let adapters = AdapterRegistry::new();
        let named = ParameterSpec::Named(vec!["a".into()]);
        assert!(matches!(
            bind_parameters(&named, &params![1], &adapters),
            Err(Error::ParameterCount(_))
        ));
        assert!(matches!(
            bind_parameters(&ParameterSpec::Positional(1), &named_params! { "a" => 1 }, &adapters),
            Err(Error::ParameterCount(_))
        ));
        assert!(bind_parameters(&ParameterSpec::None, &named_params! { "a" => 1 }, &adapters)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unadapted_object_fails() {
        struct Point;
        let adapters = AdapterRegistry::new();
        let params = Params::Positional(vec![Param::adapt(Point)]);
        assert!(matches!(
            bind_parameters(&ParameterSpec::Positional(1), &params, &adapters),
            Err(Error::Adaptation(_))
        ));
    }
}
