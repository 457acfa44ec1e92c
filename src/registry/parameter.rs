// Parameter schemas and validation
// Supplied parameters are checked against the schema before any constructor runs

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::{EngineError, EngineResult};
use crate::types::{DataType, Value};

/// Restriction on the values a parameter accepts
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Any value of the declared type
    Any,
    /// Numeric range; bounds may be open, closed or unbounded
    Range { min: Bound<f64>, max: Bound<f64> },
    /// Enumerated string choices
    Choices(&'static [&'static str]),
}

impl Constraint {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::Any => Ok(()),
            Constraint::Range { min, max } => {
                let Some(number) = value.as_number() else {
                    return Err(format!("expected a number, found {}", value.data_type()));
                };
                let above_min = match min {
                    Bound::Included(m) => number >= *m,
                    Bound::Excluded(m) => number > *m,
                    Bound::Unbounded => true,
                };
                let below_max = match max {
                    Bound::Included(m) => number <= *m,
                    Bound::Excluded(m) => number < *m,
                    Bound::Unbounded => true,
                };
                if above_min && below_max {
                    Ok(())
                } else {
                    Err(format!("{} is outside {}", number, self.describe_range()))
                }
            }
            Constraint::Choices(choices) => match value.as_str() {
                Some(s) if choices.contains(&s) => Ok(()),
                Some(s) => Err(format!("'{}' is not one of {:?}", s, choices)),
                None => Err(format!("expected a string, found {}", value.data_type())),
            },
        }
    }

    fn describe_range(&self) -> String {
        match self {
            Constraint::Range { min, max } => {
                let lower = match min {
                    Bound::Included(m) => format!("[{}", m),
                    Bound::Excluded(m) => format!("({}", m),
                    Bound::Unbounded => "(-inf".to_string(),
                };
                let upper = match max {
                    Bound::Included(m) => format!("{}]", m),
                    Bound::Excluded(m) => format!("{})", m),
                    Bound::Unbounded => "inf)".to_string(),
                };
                format!("{}, {}", lower, upper)
            }
            _ => String::new(),
        }
    }
}

/// One entry of a descriptor's parameter schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub data_type: DataType,
    /// `None` marks a required parameter (unless an equivalent batch
    /// descriptor supplies the default at registration)
    pub default: Option<Value>,
    pub constraint: Constraint,
    pub description: &'static str,
}

impl ParameterSpec {
    pub fn new(name: &'static str, data_type: DataType) -> Self {
        ParameterSpec {
            name,
            data_type,
            default: None,
            constraint: Constraint::Any,
            description: "",
        }
    }

    pub fn real(name: &'static str) -> Self {
        Self::new(name, DataType::Real)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, DataType::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, DataType::Bool)
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, DataType::String)
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Closed interval `[min, max]`
    pub fn between(mut self, min: f64, max: f64) -> Self {
        self.constraint = Constraint::Range {
            min: Bound::Included(min),
            max: Bound::Included(max),
        };
        self
    }

    /// `[min, inf)`
    pub fn at_least(mut self, min: f64) -> Self {
        self.constraint = Constraint::Range {
            min: Bound::Included(min),
            max: Bound::Unbounded,
        };
        self
    }

    /// `(0, inf)`
    pub fn positive(mut self) -> Self {
        self.constraint = Constraint::Range {
            min: Bound::Excluded(0.0),
            max: Bound::Unbounded,
        };
        self
    }

    pub fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.constraint = Constraint::Choices(choices);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Check one value against this spec, coercing integer literals where allowed
    pub fn accept(&self, algorithm: &str, value: Value) -> EngineResult<Value> {
        let value = value.coerce(self.data_type).map_err(|found| {
            EngineError::invalid_parameter(
                algorithm,
                self.name,
                format!("expected {}, found {}", self.data_type, found.data_type()),
            )
        })?;
        self.constraint
            .check(&value)
            .map_err(|reason| EngineError::invalid_parameter(algorithm, self.name, reason))?;
        Ok(value)
    }
}

/// Caller-supplied parameter values, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    values: BTreeMap<String, Value>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParameterMap {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Validated, fully resolved parameter snapshot handed to constructors
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    algorithm: String,
    values: BTreeMap<&'static str, Value>,
}

impl Parameters {
    /// Validate `supplied` against `schema`, filling in defaults
    pub fn resolve(
        algorithm: &str,
        schema: &[ParameterSpec],
        supplied: &ParameterMap,
    ) -> EngineResult<Parameters> {
        if let Some((unknown, _)) = supplied
            .iter()
            .find(|(name, _)| !schema.iter().any(|spec| spec.name == *name))
        {
            return Err(EngineError::invalid_parameter(
                algorithm,
                unknown,
                "unknown parameter",
            ));
        }

        let mut values = BTreeMap::new();
        for spec in schema {
            let value = match supplied.get(spec.name).or(spec.default.as_ref()) {
                Some(value) => value.clone(),
                None => {
                    return Err(EngineError::invalid_parameter(
                        algorithm,
                        spec.name,
                        "missing required parameter",
                    ))
                }
            };
            values.insert(spec.name, spec.accept(algorithm, value)?);
        }

        Ok(Parameters {
            algorithm: algorithm.to_string(),
            values,
        })
    }

    /// Parameters of an algorithm with an empty schema
    pub(crate) fn empty(algorithm: &str) -> Parameters {
        Parameters {
            algorithm: algorithm.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn expect_type<T>(&self, name: &str, extract: impl Fn(&Value) -> Option<T>) -> EngineResult<T> {
        let value = self.values.get(name).ok_or_else(|| {
            EngineError::invalid_parameter(&self.algorithm, name, "parameter not declared")
        })?;
        extract(value).ok_or_else(|| {
            EngineError::invalid_parameter(
                &self.algorithm,
                name,
                format!("declared as {}", value.data_type()),
            )
        })
    }

    pub fn real(&self, name: &str) -> EngineResult<f32> {
        self.expect_type(name, Value::as_real)
    }

    pub fn integer(&self, name: &str) -> EngineResult<i64> {
        self.expect_type(name, Value::as_integer)
    }

    /// Integer parameter as a size; negative values are rejected
    pub fn size(&self, name: &str) -> EngineResult<usize> {
        let value = self.integer(name)?;
        usize::try_from(value).map_err(|_| {
            EngineError::invalid_parameter(&self.algorithm, name, "must not be negative")
        })
    }

    pub fn boolean(&self, name: &str) -> EngineResult<bool> {
        self.expect_type(name, Value::as_bool)
    }

    pub fn string(&self, name: &str) -> EngineResult<String> {
        self.expect_type(name, |v| v.as_str().map(str::to_string))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::integer("frameSize").default_value(1024).at_least(1.0),
            ParameterSpec::real("sampleRate").default_value(44100.0).positive(),
            ParameterSpec::string("type")
                .default_value("hann")
                .choices(&["hann", "hamming", "square"]),
            ParameterSpec::string("filename"),
        ]
    }

    #[test]
    fn test_defaults_are_filled() {
        let supplied = ParameterMap::new().with("filename", "a.wav");
        let params = Parameters::resolve("Test", &schema(), &supplied).unwrap();

        assert_eq!(params.size("frameSize").unwrap(), 1024);
        assert_eq!(params.real("sampleRate").unwrap(), 44100.0);
        assert_eq!(params.string("type").unwrap(), "hann");
        assert_eq!(params.string("filename").unwrap(), "a.wav");
    }

    #[test]
    fn test_missing_required_parameter() {
        let result = Parameters::resolve("Test", &schema(), &ParameterMap::new());
        match result {
            Err(EngineError::InvalidParameter { parameter, reason, .. }) => {
                assert_eq!(parameter, "filename");
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_and_coercion() {
        let supplied = ParameterMap::new()
            .with("filename", "a.wav")
            .with("sampleRate", 48000);
        let params = Parameters::resolve("Test", &schema(), &supplied).unwrap();
        assert_eq!(params.real("sampleRate").unwrap(), 48000.0);

        let supplied = ParameterMap::new()
            .with("filename", "a.wav")
            .with("frameSize", "big");
        let result = Parameters::resolve("Test", &schema(), &supplied);
        assert!(matches!(result, Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_out_of_range_and_choices() {
        let supplied = ParameterMap::new()
            .with("filename", "a.wav")
            .with("sampleRate", 0.0);
        let err = Parameters::resolve("Test", &schema(), &supplied).unwrap_err();
        assert!(err.to_string().contains("outside (0, inf)"));

        let supplied = ParameterMap::new()
            .with("filename", "a.wav")
            .with("type", "triangle");
        assert!(Parameters::resolve("Test", &schema(), &supplied).is_err());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let supplied = ParameterMap::new()
            .with("filename", "a.wav")
            .with("hopSize", 256);
        let err = Parameters::resolve("Test", &schema(), &supplied).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { ref parameter, .. } if parameter == "hopSize"));
    }
}
