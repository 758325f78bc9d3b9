//! Learning parameters and their candidate values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AlgorithmError;

/// A parameter value as written in an experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn matches(&self, kind: ParamKind) -> bool {
        matches!(
            (self, kind),
            (ParamValue::Bool(_), ParamKind::Bool)
                | (ParamValue::Int(_), ParamKind::Int | ParamKind::Float)
                | (ParamValue::Float(_), ParamKind::Float)
                | (ParamValue::Text(_), ParamKind::Text)
                | (ParamValue::List(_), ParamKind::TextSet)
        )
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
            ParamValue::List(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Text,
    TextSet,
}

/// A named hyperparameter with its current value and valid range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningParameter {
    pub name: String,
    pub value: ParamValue,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    #[serde(default)]
    pub description: String,
}

impl LearningParameter {
    pub fn new(
        name: impl Into<String>,
        value: ParamValue,
        kind: ParamKind,
        min: f64,
        max: f64,
        step: f64,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            kind,
            min,
            max,
            step,
            description: String::new(),
        }
    }

    /// A float parameter in `[min, max]`.
    pub fn float(name: impl Into<String>, value: f64, min: f64, max: f64, step: f64) -> Self {
        Self::new(name, ParamValue::Float(value), ParamKind::Float, min, max, step)
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ParamValue::Text(value.into()), ParamKind::Text, 0.0, 0.0, 0.0)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A copy of this parameter carrying another value.
    pub fn with_value(&self, value: ParamValue) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// Check the value against the declared kind and numeric range.
    pub fn validate(&self) -> Result<(), AlgorithmError> {
        if !self.value.matches(self.kind) {
            return Err(AlgorithmError::InvalidParameter {
                name: self.name.clone(),
                message: format!("value {} does not match declared kind {:?}", self.value, self.kind),
            });
        }
        match self.value.as_f64() {
            Some(v) if v < self.min || v > self.max => Err(AlgorithmError::InvalidParameter {
                name: self.name.clone(),
                message: format!("{v} is outside [{}, {}]", self.min, self.max),
            }),
            _ => Ok(()),
        }
    }
}

/// Find a parameter by name.
pub fn find<'a>(params: &'a [LearningParameter], name: &str) -> Option<&'a LearningParameter> {
    params.iter().find(|p| p.name == name)
}

/// Overlay `overrides` onto `base`, matching by name.
pub fn merge(base: &[LearningParameter], overrides: &[LearningParameter]) -> Vec<LearningParameter> {
    let mut merged = base.to_vec();
    for p in overrides {
        match merged.iter_mut().find(|m| m.name == p.name) {
            Some(existing) => *existing = p.clone(),
            None => merged.push(p.clone()),
        }
    }
    merged
}

/// One grid axis: a representative parameter and its candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCandidates {
    pub parameter: LearningParameter,
    pub candidates: Vec<ParamValue>,
}

impl ParameterCandidates {
    pub fn new(parameter: LearningParameter, candidates: Vec<ParamValue>) -> Self {
        Self {
            parameter,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_kind_and_range() {
        let p = LearningParameter::float("min_threshold", 0.5, 0.0, 1.0, 0.05);
        assert!(p.validate().is_ok());
        assert!(p.with_value(ParamValue::Float(1.5)).validate().is_err());
        assert!(p.with_value(ParamValue::Int(1)).validate().is_ok());
        assert!(p.with_value(ParamValue::Text("x".into())).validate().is_err());
    }

    #[test]
    fn merge_overrides_by_name() {
        let base = vec![
            LearningParameter::float("a", 0.1, 0.0, 1.0, 0.1),
            LearningParameter::text("b", "x"),
        ];
        let merged = merge(&base, &[LearningParameter::float("a", 0.9, 0.0, 1.0, 0.1)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(find(&merged, "a").unwrap().value, ParamValue::Float(0.9));
    }

    #[test]
    fn untagged_values_deserialize() {
        let v: Vec<ParamValue> = serde_json::from_str(r#"[true, 3, 0.5, "jaccard", ["a", "b"]]"#).unwrap();
        assert_eq!(
            v,
            vec![
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(0.5),
                ParamValue::Text("jaccard".into()),
                ParamValue::List(vec!["a".into(), "b".into()]),
            ]
        );
    }
}
