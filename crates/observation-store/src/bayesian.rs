//! Bayesian inference over stored observations
//!
//! A model folds zero or more observed propositions into a posterior
//! probability for a derived proposition. Each observation is weighted and
//! decays towards "uninformative" with age. Only matched observations update
//! the belief; absent evidence leaves it untouched.

use crate::record::ObservationRecord;
use crate::store::StateValueMap;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

const PROB_EPSILON: f64 = 1e-12;

/// Custom evaluator signature: `(record, now) -> (matched, age)`
pub type EvaluatorFn = dyn Fn(&ObservationRecord, DateTime<Utc>) -> (bool, Duration) + Send + Sync;

/// Maps an observation record to whether it counts as evidence, and how old
/// that evidence is
#[derive(Clone, Default)]
pub enum Evaluator {
    /// `(record.value, now - last_update)`
    #[default]
    Current,
    /// True now or within the window; age fixed to the window length
    RecentlyTrue(Duration),
    /// `(record.value, now - last_set_true)`
    TrueSinceSet,
    Custom(Arc<EvaluatorFn>),
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::Current => f.write_str("Current"),
            Evaluator::RecentlyTrue(d) => write!(f, "RecentlyTrue({d})"),
            Evaluator::TrueSinceSet => f.write_str("TrueSinceSet"),
            Evaluator::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Evaluator {
    #[must_use]
    pub fn evaluate(&self, record: &ObservationRecord, now: DateTime<Utc>) -> (bool, Duration) {
        match self {
            Evaluator::Current => (record.value, now - record.last_update),
            Evaluator::RecentlyTrue(window) => (record.recently_true(now, *window), *window),
            Evaluator::TrueSinceSet => {
                let age = record
                    .last_set_true
                    .map_or(Duration::zero(), |t| now - t);
                (record.value, age)
            }
            Evaluator::Custom(f) => f(record, now),
        }
    }
}

/// Evidence contributed by one observed proposition
#[derive(Debug, Clone)]
pub struct Likelihood {
    /// P(observation | derived proposition true)
    pub prob_given_true: f64,
    /// P(observation | derived proposition false)
    pub prob_given_false: f64,
    /// Non-positive disables decay
    pub half_life: Duration,
    pub weight: f64,
    pub evaluator: Evaluator,
}

impl Likelihood {
    #[must_use]
    pub fn new(prob_given_true: f64, prob_given_false: f64) -> Self {
        Self {
            prob_given_true,
            prob_given_false,
            half_life: Duration::zero(),
            weight: 1.0,
            evaluator: Evaluator::Current,
        }
    }

    #[must_use]
    pub fn with_half_life(mut self, half_life: Duration) -> Self {
        self.half_life = half_life;
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Fold this evidence into `prior`, given whether it matched and its age
    #[must_use]
    pub fn update(&self, prior: f64, matched: bool, age: Duration) -> f64 {
        if !matched {
            return prior;
        }

        let p_true = apply_decay(self.prob_given_true, age, self.half_life);
        let p_false = apply_decay(self.prob_given_false, age, self.half_life);

        let w_true = clamp_probability(p_true).powf(self.weight);
        let w_false = clamp_probability(p_false).powf(self.weight);

        let multiplier = w_true / (w_true * prior + w_false * (1.0 - prior));
        multiplier * prior
    }
}

/// Exponential half-life decay of a likelihood towards 1
///
/// `p' = 1 - (1 - p) * exp(-ln 2 * age / half_life)`; a non-positive half
/// life leaves `p` unchanged and negative ages count as zero.
#[must_use]
pub fn apply_decay(p: f64, age: Duration, half_life: Duration) -> f64 {
    if half_life <= Duration::zero() {
        return p;
    }
    let age = age.max(Duration::zero());
    let ratio = seconds(age) / seconds(half_life);
    1.0 - (1.0 - p) * (-std::f64::consts::LN_2 * ratio).exp()
}

fn seconds(d: Duration) -> f64 {
    d.to_std().map_or(0.0, |d| d.as_secs_f64())
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

/// Prior, decision threshold and evidence for one derived proposition
#[derive(Debug, Clone)]
pub struct BayesianModel {
    pub prior: f64,
    pub threshold: f64,
    likelihoods: Vec<(String, Likelihood)>,
}

impl BayesianModel {
    #[must_use]
    pub fn new(prior: f64, threshold: f64) -> Self {
        Self {
            prior,
            threshold,
            likelihoods: Vec::new(),
        }
    }

    /// Attach evidence observed on `key`
    #[must_use]
    pub fn likelihood(mut self, key: impl Into<String>, likelihood: Likelihood) -> Self {
        self.likelihoods.push((key.into(), likelihood));
        self
    }

    /// Keys this model reads
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.likelihoods.iter().map(|(k, _)| k.as_str())
    }

    /// Posterior probability given the store's current contents
    ///
    /// Keys missing from the store contribute nothing.
    #[must_use]
    pub fn posterior(&self, store: &StateValueMap) -> f64 {
        let now = store.now();
        self.likelihoods
            .iter()
            .fold(self.prior, |prior, (key, likelihood)| {
                let Some(record) = store.get(key) else {
                    return prior;
                };
                let (matched, age) = likelihood.evaluator.evaluate(&record, now);
                likelihood.update(prior, matched, age)
            })
    }
}

/// Outcome of re-running a model
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub key: String,
    pub probability: f64,
    pub decision: bool,
}

/// Registry of models with a reverse index from inputs to derived keys
pub struct BayesianEngine {
    store: Arc<StateValueMap>,
    models: HashMap<String, BayesianModel>,
    dependents: HashMap<String, Vec<String>>,
}

impl BayesianEngine {
    #[must_use]
    pub fn new(store: Arc<StateValueMap>) -> Self {
        Self {
            store,
            models: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Register the model for `derived_key`, replacing any previous one
    pub fn register_model(&mut self, derived_key: impl Into<String>, model: BayesianModel) {
        let derived_key = derived_key.into();

        if let Some(previous) = self.models.remove(&derived_key) {
            for input in previous.inputs() {
                if let Some(list) = self.dependents.get_mut(input) {
                    list.retain(|k| k != &derived_key);
                }
            }
        }

        for input in model.inputs() {
            let list = self.dependents.entry(input.to_string()).or_default();
            if !list.contains(&derived_key) {
                list.push(derived_key.clone());
            }
        }

        tracing::debug!(
            "Registered Bayesian model for {} ({} inputs)",
            derived_key,
            model.likelihoods.len()
        );
        self.models.insert(derived_key, model);
    }

    #[must_use]
    pub fn model(&self, derived_key: &str) -> Option<&BayesianModel> {
        self.models.get(derived_key)
    }

    /// Derived keys whose models read `key`
    #[must_use]
    pub fn dependents(&self, key: &str) -> &[String] {
        self.dependents.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recompute `derived_key` and write the decision back into the store
    pub fn reinfer(&self, derived_key: &str) -> Option<Inference> {
        let model = self.models.get(derived_key)?;
        let probability = model.posterior(&self.store);
        let decision = probability >= model.threshold;
        self.store.set(derived_key, decision);

        tracing::debug!(
            "Inferred {} = {} (p={:.4}, threshold={})",
            derived_key,
            decision,
            probability,
            model.threshold
        );

        Some(Inference {
            key: derived_key.to_string(),
            probability,
            decision,
        })
    }

    /// Re-run every model that depends on one of `touched`
    ///
    /// Derived keys feeding other models are followed; each model runs at
    /// most once per call.
    pub fn reinfer_affected<I, S>(&self, touched: I) -> Vec<Inference>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut scheduled: HashSet<String> = HashSet::new();

        for key in touched {
            for derived in self.dependents(key.as_ref()) {
                if scheduled.insert(derived.clone()) {
                    queue.push_back(derived.clone());
                }
            }
        }

        let mut results = Vec::new();
        while let Some(derived) = queue.pop_front() {
            if let Some(inference) = self.reinfer(&derived) {
                for next in self.dependents(&derived) {
                    if scheduled.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
                results.push(inference);
            }
        }
        results
    }
}
