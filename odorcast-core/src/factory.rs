//! Model factory: turns a parsed [`MethodSpec`] into an untrained [`Model`].

use thiserror::Error;

use crate::method::{FixedMethod, HyperValue, MethodParseError, MethodSpec, TunedFamily, TunedSpec};
use crate::model::{
    DecisionTree, DummyClassifier, DummyStrategy, ElasticNet, Estimator, Forest, ForestKind, Gamma,
    HuberRegressor, HybridCrowdClassifier, IsolationForest, KNeighbors, LinearRegression,
    LogisticRegression, MaxFeatures, Mlp, Model, MultiOutput, SupportVectorClassifier,
    SupportVectorRegressor, Task, TreeParams,
};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error(transparent)]
    Parse(#[from] MethodParseError),
    #[error("method {method} is not supported for {task}")]
    UnsupportedForTask { method: String, task: &'static str },
    #[error("invalid {param} {value:?} in method {method}: {reason}")]
    InvalidHyperparameter {
        method: String,
        param: &'static str,
        value: String,
        reason: &'static str,
    },
}

// ─── Helpers ─────────────────────────────────────────────────────────

const MLP_HIDDEN: [usize; 2] = [128, 64];
const KN_NEIGHBOURS: usize = 10;

fn forest(kind: ForestKind, task: Task, n: usize, max_features: usize, mss: usize) -> Model {
    Model::Forest(Forest::new(
        kind,
        task,
        n,
        TreeParams {
            max_features: MaxFeatures::Count(max_features),
            min_samples_split: mss,
            ..TreeParams::default()
        },
    ))
}

fn task_name(task: Task) -> &'static str {
    match task {
        Task::Regression => "regression",
        Task::Classification => "classification",
    }
}

// ─── Fixed tags ──────────────────────────────────────────────────────

fn build_fixed(method: FixedMethod, task: Task) -> Option<Model> {
    use FixedMethod as F;
    let model = match (task, method) {
        (Task::Regression, F::RandomForest) => forest(ForestKind::RandomForest, task, 200, 90, 2),
        (Task::Regression, F::ExtraTrees) => forest(ForestKind::ExtraTrees, task, 200, 180, 32),
        (Task::Regression, F::Svm) => Model::Svr(SupportVectorRegressor::new(
            100.0,
            Gamma::Value(0.01),
            1000,
        )),
        (Task::Regression, F::RobustLinear) => Model::Huber(HuberRegressor::new(1000)),
        (Task::Regression, F::Linear) => Model::LinearRegression(LinearRegression::new()),
        (Task::Regression, F::ElasticNet) => Model::ElasticNet(ElasticNet::new(0.1, 0.5, 1000)),
        (Task::Regression, F::Lasso) => Model::ElasticNet(ElasticNet::lasso(0.01, 1000)),
        (Task::Regression, F::DecisionTree) => {
            Model::Tree(DecisionTree::new(task, TreeParams::default()))
        }

        (Task::Classification, F::RandomForest) => {
            forest(ForestKind::RandomForest, task, 1000, 30, 2)
        }
        (Task::Classification, F::ExtraTrees) => forest(ForestKind::ExtraTrees, task, 1000, 60, 32),
        (Task::Classification, F::Svm) => {
            Model::Svc(SupportVectorClassifier::new(1.0, Gamma::Scale, 5000))
        }
        (Task::Classification, F::Logistic) => Model::Logistic(LogisticRegression::l1(1.0)),
        (Task::Classification, F::HybridCrowd) => Model::HybridCrowd(HybridCrowdClassifier::new(
            forest(ForestKind::ExtraTrees, task, 1000, 90, 32),
        )),
        (Task::Classification, F::Crowd) => {
            Model::HybridCrowd(HybridCrowdClassifier::default())
        }
        (Task::Classification, F::DecisionTree) => Model::Tree(DecisionTree::new(
            task,
            TreeParams {
                max_depth: Some(8),
                min_samples_split: 20,
                min_samples_leaf: 5,
                ..TreeParams::default()
            },
        )),
        (Task::Classification, F::BaseStratified) => {
            Model::Dummy(DummyClassifier::new(DummyStrategy::Stratified))
        }
        (Task::Classification, F::BaseUniform) => {
            Model::Dummy(DummyClassifier::new(DummyStrategy::Uniform))
        }
        (Task::Classification, F::BaseConstant) => {
            Model::Dummy(DummyClassifier::new(DummyStrategy::Constant(1.0)))
        }
        (Task::Classification, F::IsolationForest) => {
            Model::IsolationForest(IsolationForest::new(100))
        }

        (_, F::Mlp) => Model::Mlp(Mlp::new(task, MLP_HIDDEN.to_vec())),
        (_, F::KNeighbors) => Model::KNeighbors(KNeighbors::new(task, KN_NEIGHBOURS)),
        _ => return None,
    };
    Some(model)
}

// ─── Tuned tags ──────────────────────────────────────────────────────

fn build_tuned(spec: &TunedSpec, task: Task, method: &str) -> Result<Forest, FactoryError> {
    let invalid = |param: &'static str, value: &HyperValue, reason: &'static str| {
        FactoryError::InvalidHyperparameter {
            method: method.to_string(),
            param,
            value: value.to_string(),
            reason,
        }
    };

    let n_estimators = match spec.n_estimators {
        HyperValue::Int(n) if n >= 1 => n,
        ref other => return Err(invalid("n_estimators", other, "expected an integer >= 1")),
    };
    let min_samples_split = match spec.min_samples_split {
        HyperValue::Int(n) if n >= 2 => n,
        ref other => {
            return Err(invalid(
                "min_samples_split",
                other,
                "expected an integer >= 2",
            ))
        }
    };
    let max_features = match &spec.max_features {
        HyperValue::Unbounded => MaxFeatures::All,
        HyperValue::Int(n) if *n >= 1 => MaxFeatures::Count(*n),
        HyperValue::Literal(s) if s == "auto" => MaxFeatures::Auto,
        HyperValue::Literal(s) if s == "sqrt" => MaxFeatures::Sqrt,
        HyperValue::Literal(s) if s == "log2" => MaxFeatures::Log2,
        other => {
            return Err(invalid(
                "max_features",
                other,
                "expected None, an integer >= 1, auto, sqrt or log2",
            ))
        }
    };

    let kind = match spec.family {
        TunedFamily::RandomForest => ForestKind::RandomForest,
        TunedFamily::ExtraTrees => ForestKind::ExtraTrees,
    };
    let params = TreeParams {
        max_features,
        min_samples_split,
        ..TreeParams::default()
    };
    Ok(Forest::new(kind, task, n_estimators, params))
}

// ─── Public entry point ──────────────────────────────────────────────

/// Build the untrained estimator for `method`.
///
/// Tuned tags are seeded with 0; fixed tags are left unseeded. When
/// `n_outputs > 1` and the estimator is single-output it is wrapped in a
/// [`MultiOutput`] adapter.
pub fn build_model(
    method: &MethodSpec,
    is_regression: bool,
    n_outputs: usize,
) -> Result<Model, FactoryError> {
    let task = Task::from_is_regression(is_regression);
    let tag = method.to_string();
    let model = match method {
        MethodSpec::Fixed(fixed) => {
            build_fixed(*fixed, task).ok_or_else(|| FactoryError::UnsupportedForTask {
                method: tag.clone(),
                task: task_name(task),
            })?
        }
        MethodSpec::Tuned(spec) => {
            Model::Forest(build_tuned(spec, task, &tag)?.with_seed(method.seed()))
        }
    };

    if n_outputs > 1 && !model.supports_multi_output() {
        return Ok(Model::MultiOutput(MultiOutput::new(model)));
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(tag: &str, is_regression: bool, n_outputs: usize) -> Result<Model, FactoryError> {
        build_model(&tag.parse()?, is_regression, n_outputs)
    }

    #[test]
    fn every_fixed_tag_builds_for_some_task() {
        for m in FixedMethod::ALL {
            let spec = MethodSpec::Fixed(m);
            let reg = build_model(&spec, true, 1).is_ok();
            let clf = build_model(&spec, false, 1).is_ok();
            assert!(reg || clf, "{} builds for neither task", m.tag());
        }
    }

    #[test]
    fn task_specific_tags_are_rejected_for_the_other_task() {
        for tag in ["LR", "EN", "LA", "RLR"] {
            assert!(matches!(
                build(tag, false, 1),
                Err(FactoryError::UnsupportedForTask { .. })
            ));
        }
        for tag in ["LG", "HCR", "CR", "Base1", "Base2", "Base3", "IF"] {
            assert!(matches!(
                build(tag, true, 1),
                Err(FactoryError::UnsupportedForTask { .. })
            ));
        }
    }

    #[test]
    fn fixed_tables_pick_documented_estimators() {
        match build("ET", false, 1).unwrap() {
            Model::Forest(f) => {
                assert_eq!(f.kind(), ForestKind::ExtraTrees);
                assert_eq!(f.n_estimators(), 1000);
                assert_eq!(f.params().max_features, MaxFeatures::Count(60));
                assert_eq!(f.params().min_samples_split, 32);
                assert_eq!(f.seed(), None);
            }
            other => panic!("unexpected {}", other.name()),
        }
        match build("RF", true, 1).unwrap() {
            Model::Forest(f) => {
                assert_eq!(f.kind(), ForestKind::RandomForest);
                assert_eq!(f.n_estimators(), 200);
                assert_eq!(f.params().max_features, MaxFeatures::Count(90));
            }
            other => panic!("unexpected {}", other.name()),
        }
        match build("DT", false, 1).unwrap() {
            Model::Tree(t) => {
                assert_eq!(t.params().max_depth, Some(8));
                assert_eq!(t.params().min_samples_leaf, 5);
            }
            other => panic!("unexpected {}", other.name()),
        }
        assert_eq!(build("SVM", true, 1).unwrap().name(), "svr");
        assert_eq!(build("SVM", false, 1).unwrap().name(), "svc");
        assert_eq!(build("HCR", false, 1).unwrap().name(), "hybrid_crowd");
    }

    #[test]
    fn tuned_tag_is_seeded() {
        match build("RF-100-None-5", true, 1).unwrap() {
            Model::Forest(f) => {
                assert_eq!(f.n_estimators(), 100);
                assert_eq!(f.params().max_features, MaxFeatures::All);
                assert_eq!(f.params().min_samples_split, 5);
                assert_eq!(f.seed(), Some(0));
            }
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn invalid_tuned_values_are_rejected() {
        for tag in ["RF-0-None-5", "RF-10-None-1", "ET-10-half-2", "ET-x-sqrt-2", "RF-10-0-2"] {
            assert!(
                matches!(
                    build(tag, true, 1),
                    Err(FactoryError::InvalidHyperparameter { .. })
                ),
                "{tag}"
            );
        }
    }

    #[test]
    fn single_output_estimators_are_wrapped() {
        assert_eq!(build("LR", true, 3).unwrap().name(), "multi_output");
        assert_eq!(build("LR", true, 1).unwrap().name(), "linear_regression");
        assert_eq!(build("ET", true, 3).unwrap().name(), "extra_trees");
        assert_eq!(build("KN", true, 3).unwrap().name(), "k_neighbors");
        assert_eq!(build("MLP", true, 3).unwrap().name(), "mlp");
        assert_eq!(build("MLP", false, 3).unwrap().name(), "multi_output");
    }

    #[test]
    fn unknown_tag_surfaces_parse_error() {
        assert!(matches!(build("XYZ", true, 1), Err(FactoryError::Parse(_))));
    }
}
