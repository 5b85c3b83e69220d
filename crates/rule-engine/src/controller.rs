//! Controller contract and the plumbing shared by controllers

use crate::machine::StateMachine;
use bus_protocol::{BusEvent, Publication};
use observation_store::{BayesianEngine, StateValueMap};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A subsystem policy driven by bus events
///
/// The dispatcher serialises calls per controller; implementations never
/// see two events at once.
pub trait Controller: Send {
    fn name(&self) -> &str;

    fn is_initialized(&self) -> bool;

    /// Try to pick an initial state
    ///
    /// Called before each event until `is_initialized` returns true.
    fn initialize(&mut self) -> Vec<Publication>;

    /// Handle one event and return what should be published
    fn process_event(&mut self, event: &BusEvent) -> Vec<Publication>;

    /// Current state for display, if the controller has one
    fn state_label(&self) -> Option<String> {
        None
    }
}

/// Shared dependencies handed to controllers at construction
#[derive(Clone)]
pub struct ControllerContext {
    pub store: Arc<StateValueMap>,
    pub bayesian: Arc<BayesianEngine>,
    pub sink: PublicationSink,
    /// Root token; background tasks use children of it
    pub shutdown: CancellationToken,
}

/// Queue of publications collected while handling one event
#[derive(Debug, Clone, Default)]
pub struct Outbox(Arc<Mutex<Vec<Publication>>>);

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, publication: Publication) {
        self.lock().push(publication);
    }

    pub fn extend(&self, publications: impl IntoIterator<Item = Publication>) {
        self.lock().extend(publications);
    }

    /// Take everything queued so far
    #[must_use]
    pub fn drain(&self) -> Vec<Publication> {
        std::mem::take(&mut *self.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Publication>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Channel for publications produced outside of event handling
#[derive(Debug, Clone)]
pub struct PublicationSink {
    tx: mpsc::UnboundedSender<Publication>,
}

impl PublicationSink {
    /// Create a sink and the receiver the dispatcher drains
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Publication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a publication; returns false once the dispatcher is gone
    pub fn publish(&self, publication: Publication) -> bool {
        match self.tx.send(publication) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping publication on {}: dispatcher stopped", e.0.topic);
                false
            }
        }
    }
}

/// Extra per-event hook run before the machine fires
pub type EventHandler = Box<dyn FnMut(&BusEvent, &Outbox) + Send>;

/// Picks the initial state; may leave the machine uninitialized and
/// return probe publications instead
pub type Initializer<S> = Box<dyn FnMut(&mut StateMachine<S>) -> Vec<Publication> + Send>;

/// A state machine plus its outbox, extra handlers and initializer
pub struct MachineController<S> {
    machine: StateMachine<S>,
    outbox: Outbox,
    handlers: Vec<EventHandler>,
    initializer: Initializer<S>,
}

impl<S> MachineController<S>
where
    S: Copy + Eq + Debug + Send + 'static,
{
    #[must_use]
    pub fn new<I>(machine: StateMachine<S>, initializer: I) -> Self
    where
        I: FnMut(&mut StateMachine<S>) -> Vec<Publication> + Send + 'static,
    {
        Self {
            machine,
            outbox: Outbox::new(),
            handlers: Vec::new(),
            initializer: Box::new(initializer),
        }
    }

    /// Controller that always starts in `initial`, without publishing
    #[must_use]
    pub fn starting_in(machine: StateMachine<S>, initial: S) -> Self {
        Self::new(machine, move |m| {
            m.initialize(initial);
            Vec::new()
        })
    }

    pub fn add_handler<H>(&mut self, handler: H)
    where
        H: FnMut(&BusEvent, &Outbox) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    #[must_use]
    pub fn machine(&self) -> &StateMachine<S> {
        &self.machine
    }
}

impl<S> Controller for MachineController<S>
where
    S: Copy + Eq + Debug + Send + 'static,
{
    fn name(&self) -> &str {
        self.machine.name()
    }

    fn is_initialized(&self) -> bool {
        self.machine.is_initialized()
    }

    fn initialize(&mut self) -> Vec<Publication> {
        (self.initializer)(&mut self.machine)
    }

    /// Run the handlers, fire the machine if it is initialized, drain
    fn process_event(&mut self, event: &BusEvent) -> Vec<Publication> {
        for handler in &mut self.handlers {
            handler(event, &self.outbox);
        }
        if self.machine.is_initialized() {
            let publications = self.machine.fire();
            self.outbox.extend(publications);
        }
        self.outbox.drain()
    }

    fn state_label(&self) -> Option<String> {
        self.machine.state().map(|s| format!("{s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_drain_is_atomic_take() {
        let outbox = Outbox::new();
        let clone = outbox.clone();
        clone.push(Publication::new("a", "1"));
        clone.extend([Publication::new("b", "2")]);
        assert_eq!(outbox.len(), 2);
        let drained = outbox.drain();
        assert_eq!(drained.len(), 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_sink_reports_closed_dispatcher() {
        let (sink, mut rx) = PublicationSink::channel();
        assert!(sink.publish(Publication::new("a", "1")));
        assert_eq!(rx.try_recv().unwrap().topic, "a");
        drop(rx);
        assert!(!sink.publish(Publication::new("a", "2")));
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
    }

    #[test]
    fn test_handlers_run_before_uninitialized_machine() {
        let store = Arc::new(StateValueMap::default());
        let mut machine = StateMachine::new("door", store.clone());
        machine
            .permit(Door::Closed, Door::Open, |s| s.currently_true("open"))
            .on_entry(Door::Open, |_| Ok(vec![Publication::new("door", "open")]));
        let mut controller = MachineController::starting_in(machine, Door::Closed);
        controller.add_handler(|event, outbox| {
            outbox.push(Publication::new("seen", event.topic.clone()));
        });

        store.set("open", true);
        let out = controller.process_event(&BusEvent::new("x", "1"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, "seen");
        assert!(!controller.is_initialized());

        assert!(controller.initialize().is_empty());
        assert!(controller.is_initialized());
        let out = controller.process_event(&BusEvent::new("x", "1"));
        assert_eq!(
            out.iter().map(|p| p.topic.as_str()).collect::<Vec<_>>(),
            vec!["seen", "door"]
        );
        assert_eq!(controller.state_label().as_deref(), Some("Open"));
    }
}
