//! Guarded state machine driven by bus events
//!
//! The only trigger is "an event arrived". Guards look at the observation
//! store, never at the payload. Actions return the publications they want
//! sent; those are only handed out once the whole transition succeeded.

use crate::error::ActionError;
use bus_protocol::Publication;
use observation_store::StateValueMap;
use std::fmt::Debug;
use std::sync::Arc;

type Guard = Box<dyn Fn(&StateValueMap) -> Result<bool, ActionError> + Send + Sync>;

/// Entry or exit action
pub type Action<S> = Box<dyn Fn(Step<S>) -> Result<Vec<Publication>, ActionError> + Send + Sync>;

/// The transition an action runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<S> {
    pub from: S,
    pub to: S,
}

struct Transition<S> {
    from: S,
    to: S,
    guard: Guard,
}

/// State machine over a small copyable state enum
pub struct StateMachine<S> {
    name: String,
    store: Arc<StateValueMap>,
    state: Option<S>,
    transitions: Vec<Transition<S>>,
    on_entry: Vec<(S, Action<S>)>,
    on_exit: Vec<(S, Action<S>)>,
}

impl<S> StateMachine<S>
where
    S: Copy + Eq + Debug + Send + 'static,
{
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<StateValueMap>) -> Self {
        Self {
            name: name.into(),
            store,
            state: None,
            transitions: Vec::new(),
            on_entry: Vec::new(),
            on_exit: Vec::new(),
        }
    }

    /// Allow `from -> to` when `guard` holds
    ///
    /// Transitions from a state to itself are never taken; declare those
    /// with [`permit_reentry`](Self::permit_reentry).
    pub fn permit<G>(&mut self, from: S, to: S, guard: G) -> &mut Self
    where
        G: Fn(&StateValueMap) -> bool + Send + Sync + 'static,
    {
        self.permit_checked(from, to, move |store| Ok(guard(store)))
    }

    /// Allow `from -> to` when a fallible guard returns `Ok(true)`
    ///
    /// A guard error counts as false.
    pub fn permit_checked<G>(&mut self, from: S, to: S, guard: G) -> &mut Self
    where
        G: Fn(&StateValueMap) -> Result<bool, ActionError> + Send + Sync + 'static,
    {
        if from == to {
            tracing::warn!(
                "{}: ignoring self-transition {:?}; use permit_reentry",
                self.name,
                from
            );
            return self;
        }
        self.push(from, to, Box::new(guard));
        self
    }

    /// Allow leaving and re-entering `state` when `guard` holds
    pub fn permit_reentry<G>(&mut self, state: S, guard: G) -> &mut Self
    where
        G: Fn(&StateValueMap) -> bool + Send + Sync + 'static,
    {
        self.push(state, state, Box::new(move |store| Ok(guard(store))));
        self
    }

    fn push(&mut self, from: S, to: S, guard: Guard) {
        self.transitions.push(Transition { from, to, guard });
    }

    pub fn on_entry<A>(&mut self, state: S, action: A) -> &mut Self
    where
        A: Fn(Step<S>) -> Result<Vec<Publication>, ActionError> + Send + Sync + 'static,
    {
        self.on_entry.push((state, Box::new(action)));
        self
    }

    pub fn on_exit<A>(&mut self, state: S, action: A) -> &mut Self
    where
        A: Fn(Step<S>) -> Result<Vec<Publication>, ActionError> + Send + Sync + 'static,
    {
        self.on_exit.push((state, Box::new(action)));
        self
    }

    /// Put the machine in `state` without running any action
    pub fn initialize(&mut self, state: S) {
        tracing::info!("{}: initialized in {:?}", self.name, state);
        self.state = Some(state);
    }

    #[must_use]
    pub fn state(&self) -> Option<S> {
        self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateValueMap> {
        &self.store
    }

    /// Take the first permitted transition out of the current state
    ///
    /// Returns the publications of its exit and entry actions. If any action
    /// fails the machine stays where it was and nothing is returned.
    pub fn fire(&mut self) -> Vec<Publication> {
        let Some(current) = self.state else {
            return Vec::new();
        };

        let Some(to) = self.select(current) else {
            return Vec::new();
        };

        let step = Step { from: current, to };
        match self.run_actions(step) {
            Ok(publications) => {
                tracing::info!("{}: {:?} -> {:?}", self.name, current, to);
                self.state = Some(to);
                publications
            }
            Err(e) => {
                tracing::error!(
                    "{}: transition {:?} -> {:?} aborted: {}",
                    self.name,
                    current,
                    to,
                    e
                );
                Vec::new()
            }
        }
    }

    fn select(&self, current: S) -> Option<S> {
        self.transitions
            .iter()
            .filter(|t| t.from == current)
            .find(|t| match (t.guard)(&self.store) {
                Ok(holds) => holds,
                Err(e) => {
                    tracing::warn!("{}: guard {:?} -> {:?} failed: {}", self.name, t.from, t.to, e);
                    false
                }
            })
            .map(|t| t.to)
    }

    fn run_actions(&self, step: Step<S>) -> Result<Vec<Publication>, ActionError> {
        let exits = self.on_exit.iter().filter(|(s, _)| *s == step.from);
        let entries = self.on_entry.iter().filter(|(s, _)| *s == step.to);

        let mut publications = Vec::new();
        for (_, action) in exits.chain(entries) {
            publications.extend(action(step)?);
        }
        Ok(publications)
    }
}
