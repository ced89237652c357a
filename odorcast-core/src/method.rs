//! Method tags: the fixed estimator names and the tuned
//! `{family}-{n_estimators}-{max_features}-{min_samples_split}` form.
//!
//! Parsing only checks shape. Whether a tag is valid for a task and whether
//! its hyperparameters make sense is decided by the factory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodParseError {
    #[error("empty method tag")]
    Empty,
    #[error("malformed tuned method tag {tag:?}: expected family-n_estimators-max_features-min_samples_split, got {tokens} tokens")]
    Malformed { tag: String, tokens: usize },
    #[error("method {tag:?} is not supported (family {family:?} has no tuned form)")]
    UnsupportedFamily { tag: String, family: String },
}

/// Named estimators with fixed hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedMethod {
    RandomForest,
    ExtraTrees,
    Svm,
    RobustLinear,
    Linear,
    ElasticNet,
    Lasso,
    Mlp,
    KNeighbors,
    DecisionTree,
    Logistic,
    HybridCrowd,
    Crowd,
    BaseStratified,
    BaseUniform,
    BaseConstant,
    IsolationForest,
}

impl FixedMethod {
    pub const ALL: [FixedMethod; 17] = [
        FixedMethod::RandomForest,
        FixedMethod::ExtraTrees,
        FixedMethod::Svm,
        FixedMethod::RobustLinear,
        FixedMethod::Linear,
        FixedMethod::ElasticNet,
        FixedMethod::Lasso,
        FixedMethod::Mlp,
        FixedMethod::KNeighbors,
        FixedMethod::DecisionTree,
        FixedMethod::Logistic,
        FixedMethod::HybridCrowd,
        FixedMethod::Crowd,
        FixedMethod::BaseStratified,
        FixedMethod::BaseUniform,
        FixedMethod::BaseConstant,
        FixedMethod::IsolationForest,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            FixedMethod::RandomForest => "RF",
            FixedMethod::ExtraTrees => "ET",
            FixedMethod::Svm => "SVM",
            FixedMethod::RobustLinear => "RLR",
            FixedMethod::Linear => "LR",
            FixedMethod::ElasticNet => "EN",
            FixedMethod::Lasso => "LA",
            FixedMethod::Mlp => "MLP",
            FixedMethod::KNeighbors => "KN",
            FixedMethod::DecisionTree => "DT",
            FixedMethod::Logistic => "LG",
            FixedMethod::HybridCrowd => "HCR",
            FixedMethod::Crowd => "CR",
            FixedMethod::BaseStratified => "Base1",
            FixedMethod::BaseUniform => "Base2",
            FixedMethod::BaseConstant => "Base3",
            FixedMethod::IsolationForest => "IF",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.tag() == tag)
    }
}

/// Families that accept the tuned tag form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunedFamily {
    RandomForest,
    ExtraTrees,
}

impl TunedFamily {
    pub fn tag(&self) -> &'static str {
        match self {
            TunedFamily::RandomForest => "RF",
            TunedFamily::ExtraTrees => "ET",
        }
    }
}

/// One hyperparameter token of a tuned tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HyperValue {
    /// `None`: no limit.
    Unbounded,
    Int(usize),
    /// Any other token, e.g. `sqrt`.
    Literal(String),
}

impl HyperValue {
    fn parse(token: &str) -> Self {
        if token == "None" {
            HyperValue::Unbounded
        } else if let Ok(n) = token.parse::<usize>() {
            HyperValue::Int(n)
        } else {
            HyperValue::Literal(token.to_string())
        }
    }
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperValue::Unbounded => f.write_str("None"),
            HyperValue::Int(n) => write!(f, "{n}"),
            HyperValue::Literal(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunedSpec {
    pub family: TunedFamily,
    pub n_estimators: HyperValue,
    pub max_features: HyperValue,
    pub min_samples_split: HyperValue,
}

/// A parsed method tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MethodSpec {
    Fixed(FixedMethod),
    Tuned(TunedSpec),
}

impl MethodSpec {
    /// Whether fitting needs the crowd frame.
    pub fn is_crowd_aware(&self) -> bool {
        matches!(
            self,
            MethodSpec::Fixed(FixedMethod::HybridCrowd | FixedMethod::Crowd)
        )
    }

    /// Whether training is restricted to the minority class.
    pub fn is_one_class(&self) -> bool {
        matches!(self, MethodSpec::Fixed(FixedMethod::IsolationForest))
    }

    /// Tuned tags are seeded; fixed tags are not.
    pub fn seed(&self) -> Option<u64> {
        match self {
            MethodSpec::Tuned(_) => Some(0),
            MethodSpec::Fixed(_) => None,
        }
    }
}

impl FromStr for MethodSpec {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MethodParseError::Empty);
        }
        if let Some(fixed) = FixedMethod::from_tag(s) {
            return Ok(MethodSpec::Fixed(fixed));
        }

        let tokens: Vec<&str> = s.split('-').collect();
        let family = match tokens[0] {
            "RF" => TunedFamily::RandomForest,
            "ET" => TunedFamily::ExtraTrees,
            other => {
                return Err(MethodParseError::UnsupportedFamily {
                    tag: s.to_string(),
                    family: other.to_string(),
                })
            }
        };
        if tokens.len() != 4 {
            return Err(MethodParseError::Malformed {
                tag: s.to_string(),
                tokens: tokens.len(),
            });
        }
        Ok(MethodSpec::Tuned(TunedSpec {
            family,
            n_estimators: HyperValue::parse(tokens[1]),
            max_features: HyperValue::parse(tokens[2]),
            min_samples_split: HyperValue::parse(tokens[3]),
        }))
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSpec::Fixed(m) => f.write_str(m.tag()),
            MethodSpec::Tuned(t) => write!(
                f,
                "{}-{}-{}-{}",
                t.family.tag(),
                t.n_estimators,
                t.max_features,
                t.min_samples_split
            ),
        }
    }
}

impl TryFrom<String> for MethodSpec {
    type Error = MethodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MethodSpec> for String {
    fn from(value: MethodSpec) -> Self {
        value.to_string()
    }
}
