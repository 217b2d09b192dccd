use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DashboardError, RenderError};

/// A value carried by an input control.
///
/// Sliders send numbers and dropdowns send strings; the untagged
/// representation matches what the page posts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    Text(String),
}

impl InputValue {
    pub fn text(value: impl Into<String>) -> Self {
        InputValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(s) => Some(s),
            InputValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            InputValue::Number(n) => Some(*n),
            InputValue::Text(_) => None,
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Number(value)
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Number(n) => write!(f, "{}", n),
            InputValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// The set of values an input accepts.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// One of a fixed list of strings (a dropdown).
    Enumerated { options: Vec<String> },
    /// A number in `min..=max` reachable from `min` in whole `step`s (a slider).
    Range { min: f64, max: f64, step: f64 },
    /// Any string.
    FreeText,
}

impl Domain {
    pub fn enumerated<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Domain::Enumerated {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns why `value` is outside this domain, if it is.
    pub fn check(&self, value: &InputValue) -> Result<(), String> {
        match (self, value) {
            (Domain::Enumerated { options }, InputValue::Text(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(())
                } else {
                    Err("not one of the declared options".to_string())
                }
            }
            (Domain::Enumerated { .. }, InputValue::Number(_)) => {
                Err("expected one of the declared options, got a number".to_string())
            }
            (Domain::Range { min, max, step }, InputValue::Number(n)) => {
                if !n.is_finite() || *n < *min || *n > *max {
                    return Err(format!("outside {}..={}", min, max));
                }
                if *step > 0.0 {
                    let steps = (n - min) / step;
                    if (steps - steps.round()).abs() > 1e-9 {
                        return Err(format!("not a multiple of step {} from {}", step, min));
                    }
                }
                Ok(())
            }
            (Domain::Range { .. }, InputValue::Text(_)) => {
                Err("expected a number, got text".to_string())
            }
            (Domain::FreeText, InputValue::Text(_)) => Ok(()),
            (Domain::FreeText, InputValue::Number(_)) => {
                Err("expected text, got a number".to_string())
            }
        }
    }
}

/// Declaration of a single input.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub domain: Domain,
    pub default: InputValue,
}

/// Values of every declared input at one instant.
///
/// Render functions only ever see a `Snapshot`, never the live surface, so
/// all inputs they read come from the same state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot(BTreeMap<String, InputValue>);

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    /// Reads a text input, failing the render if it is absent or numeric.
    pub fn text(&self, name: &str) -> Result<&str, RenderError> {
        self.get(name)
            .and_then(InputValue::as_text)
            .ok_or_else(|| RenderError::new(format!("input \"{}\" has no text value", name)))
    }

    /// Reads a numeric input, failing the render if it is absent or text.
    pub fn number(&self, name: &str) -> Result<f64, RenderError> {
        self.get(name)
            .and_then(InputValue::as_number)
            .ok_or_else(|| RenderError::new(format!("input \"{}\" has no numeric value", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<InputValue>> FromIterator<(K, V)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Snapshot(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Declared inputs and their current values.
///
/// One surface is built at startup as a template; each session clones it
/// and from then on owns its copy.
#[derive(Clone, Debug, Default)]
pub struct InputSurface {
    specs: Vec<InputSpec>,
    values: BTreeMap<String, InputValue>,
}

impl InputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an input with its domain and default.
    ///
    /// # Errors
    /// * `DuplicateInput` if `name` is already declared
    /// * `InvalidInputValue` if `default` is outside `domain`
    pub fn declare(
        &mut self,
        name: &str,
        domain: Domain,
        default: InputValue,
    ) -> Result<(), DashboardError> {
        if self.is_declared(name) {
            return Err(DashboardError::DuplicateInput(name.to_string()));
        }
        domain
            .check(&default)
            .map_err(|reason| DashboardError::InvalidInputValue {
                input: name.to_string(),
                value: default.to_string(),
                reason,
            })?;

        self.values.insert(name.to_string(), default.clone());
        self.specs.push(InputSpec {
            name: name.to_string(),
            domain,
            default,
        });
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn spec(&self, name: &str) -> Option<&InputSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Declarations in declaration order.
    pub fn specs(&self) -> &[InputSpec] {
        &self.specs
    }

    pub fn value(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    pub fn current(&self) -> Snapshot {
        Snapshot(self.values.clone())
    }

    /// Checks `value` against the declared domain of `name`.
    pub fn validate(&self, name: &str, value: &InputValue) -> Result<(), DashboardError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| DashboardError::NoSuchInput(name.to_string()))?;
        spec.domain
            .check(value)
            .map_err(|reason| DashboardError::InvalidInputValue {
                input: name.to_string(),
                value: value.to_string(),
                reason,
            })
    }

    /// Stores a value that has already been validated.
    pub(crate) fn set(&mut self, name: &str, value: InputValue) {
        debug_assert!(self.validate(name, &value).is_ok());
        self.values.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> InputSurface {
        let mut inputs = InputSurface::new();
        inputs
            .declare(
                "category",
                Domain::enumerated(["ART_AND_DESIGN", "GAME", "TOOLS"]),
                "GAME".into(),
            )
            .unwrap();
        inputs
            .declare(
                "version",
                Domain::Range {
                    min: 1.0,
                    max: 8.0,
                    step: 1.0,
                },
                1.0.into(),
            )
            .unwrap();
        inputs
    }

    #[test]
    fn rejects_value_outside_enumeration() {
        let inputs = surface();
        let err = inputs.validate("category", &"FOOBAR".into()).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidInputValue { .. }));
        assert!(inputs.validate("category", &"TOOLS".into()).is_ok());
    }

    #[test]
    fn range_checks_bounds_and_step() {
        let inputs = surface();
        assert!(inputs.validate("version", &8.0.into()).is_ok());
        assert!(inputs.validate("version", &0.0.into()).is_err());
        assert!(inputs.validate("version", &9.0.into()).is_err());
        assert!(inputs.validate("version", &2.5.into()).is_err());
        assert!(inputs.validate("version", &f64::NAN.into()).is_err());
    }

    #[test]
    fn slider_rejects_version_strings() {
        let inputs = surface();
        assert!(inputs.validate("version", &"4.0.3 and up".into()).is_err());
    }

    #[test]
    fn unknown_input_is_reported() {
        let inputs = surface();
        assert_eq!(
            inputs.validate("nope", &"x".into()).unwrap_err(),
            DashboardError::NoSuchInput("nope".to_string())
        );
    }

    #[test]
    fn declare_rejects_duplicates_and_bad_defaults() {
        let mut inputs = surface();
        assert_eq!(
            inputs
                .declare("category", Domain::FreeText, "x".into())
                .unwrap_err(),
            DashboardError::DuplicateInput("category".to_string())
        );
        assert!(
            inputs
                .declare("other", Domain::enumerated(["A"]), "B".into())
                .is_err()
        );
        assert!(!inputs.is_declared("other"));
    }

    #[test]
    fn current_reflects_defaults() {
        let inputs = surface();
        let snap = inputs.current();
        assert_eq!(snap.text("category").unwrap(), "GAME");
        assert_eq!(snap.number("version").unwrap(), 1.0);
        assert!(snap.number("category").is_err());
    }

    #[test]
    fn untagged_values_deserialize_from_json() {
        let n: InputValue = serde_json::from_str("3").unwrap();
        let s: InputValue = serde_json::from_str("\"GAME\"").unwrap();
        assert_eq!(n, InputValue::Number(3.0));
        assert_eq!(s, InputValue::text("GAME"));
    }
}
