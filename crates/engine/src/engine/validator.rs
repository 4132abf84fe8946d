//! Argument validation against a parameter schema.
//!
//! A single pass collects every problem:
//! - supplied names the schema does not declare
//! - references that do not resolve against the accumulator
//! - values that cannot be converted to the declared type
//! - required parameters that were not supplied

use branchline_apps::{Accumulator, ArgumentMap, ParameterSchema};

use crate::error::{ArgumentError, ArgumentIssue};
use crate::model::{Argument, ArgumentSource};

/// Validate `arguments` against `schema` and return the converted map.
///
/// Without an accumulator (definition time) references are accepted
/// as-is and left out of the returned map.
pub fn validate_arguments(
    schema: &ParameterSchema,
    arguments: &[Argument],
    accumulator: Option<&Accumulator>,
) -> Result<ArgumentMap, ArgumentError> {
    let mut issues = Vec::new();
    let mut converted = ArgumentMap::new();

    for argument in arguments {
        let Some(spec) = schema.get(&argument.name) else {
            issues.push(ArgumentIssue::UnknownParameter {
                name: argument.name.clone(),
                value: argument.raw(),
            });
            continue;
        };

        let value = match (&argument.source, accumulator) {
            (ArgumentSource::Reference { .. }, None) => continue,
            (ArgumentSource::Reference { reference, .. }, Some(acc)) => {
                match argument.resolve(acc) {
                    Some(value) => value,
                    None => {
                        issues.push(ArgumentIssue::UnresolvedReference {
                            name: argument.name.clone(),
                            reference: reference.clone(),
                        });
                        continue;
                    }
                }
            }
            (ArgumentSource::Value { value }, _) => value.clone(),
        };

        match spec.param_type.convert(&value) {
            Some(v) => {
                converted.insert(spec.name.clone(), v);
            }
            None => issues.push(ArgumentIssue::TypeConversionFailed {
                name: argument.name.clone(),
                value,
                expected: spec.param_type,
            }),
        }
    }

    for spec in schema.iter() {
        let supplied = arguments.iter().any(|a| a.name == spec.name);
        if supplied {
            continue;
        }
        if let Some(default) = &spec.default {
            converted.insert(spec.name.clone(), default.clone());
        } else if spec.required {
            issues.push(ArgumentIssue::MissingRequiredParameter {
                name: spec.name.clone(),
            });
        }
    }

    if issues.is_empty() {
        Ok(converted)
    } else {
        Err(ArgumentError { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchline_apps::{ParamType, ParameterSpec};
    use serde_json::json;

    fn int_x() -> ParameterSchema {
        ParameterSchema::default().with(ParameterSpec::required("x", ParamType::Integer))
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&int_x(), &[], None).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ArgumentIssue::MissingRequiredParameter {
                name: "x".to_string()
            }]
        );
    }

    #[test]
    fn test_conversion_failure() {
        let err = validate_arguments(&int_x(), &[Argument::value("x", json!("abc"))], None)
            .unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(matches!(
            &err.issues[0],
            ArgumentIssue::TypeConversionFailed { name, expected: ParamType::Integer, .. } if name == "x"
        ));

        let err = validate_arguments(&int_x(), &[Argument::value("x", json!(1e300))], None)
            .unwrap_err();
        assert!(matches!(
            &err.issues[..],
            [ArgumentIssue::TypeConversionFailed { .. }]
        ));
    }

    #[test]
    fn test_converts_and_applies_defaults() {
        let schema = int_x()
            .with(ParameterSpec::optional("flag", ParamType::Boolean).with_default(json!(false)))
            .with(ParameterSpec::optional("note", ParamType::String));

        let map = validate_arguments(&schema, &[Argument::value("x", json!("42"))], None).unwrap();
        assert_eq!(map.get("x"), Some(&json!(42)));
        assert_eq!(map.get("flag"), Some(&json!(false)));
        assert!(!map.contains_key("note"));
    }

    #[test]
    fn test_collects_every_issue() {
        let schema = int_x().with(ParameterSpec::required("y", ParamType::String));
        let args = vec![
            Argument::value("x", json!([1])),
            Argument::value("z", json!(true)),
        ];
        let err = validate_arguments(&schema, &args, None).unwrap_err();
        assert_eq!(err.issues.len(), 3);
        let names: Vec<&str> = err.issues.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["x", "z", "y"]);
    }

    #[test]
    fn test_references() {
        let args = vec![Argument::reference("x", "start")];

        // Definition time: accepted without a type check.
        assert!(validate_arguments(&int_x(), &args, None).unwrap().is_empty());

        let mut acc = Accumulator::new();
        acc.insert("start".to_string(), json!("7"));
        let map = validate_arguments(&int_x(), &args, Some(&acc)).unwrap();
        assert_eq!(map.get("x"), Some(&json!(7)));

        let err = validate_arguments(&int_x(), &[Argument::reference("x", "later")], Some(&acc))
            .unwrap_err();
        assert!(matches!(
            &err.issues[0],
            ArgumentIssue::UnresolvedReference { reference, .. } if reference == "later"
        ));
    }
}
