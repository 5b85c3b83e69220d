//! The dispatcher
//!
//! Every event first runs through the extractors (serialised by the
//! dispatcher lock), then the Bayesian models fed by the touched keys are
//! re-run, and finally each controller gets the event on its own worker.
//! Workers process their queue in arrival order; controllers never wait
//! for each other.

use crate::controller::{Controller, ControllerContext, PublicationSink};
use crate::publisher::Publisher;
use crate::EngineError;
use bus_protocol::{BusEvent, MessageBus, Publication};
use futures::future::join_all;
use observation_store::{BayesianEngine, Extractor, Inference, StateValueMap};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// What extraction did with one event
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Store writes made by the extractors
    pub writes: usize,
    /// Writes (derived ones included) that changed a value
    pub changed: usize,
    /// Extractors that rejected the payload
    pub rejected: usize,
    pub inferred: Vec<Inference>,
}

/// Snapshot of one controller for display
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub name: String,
    pub initialized: bool,
    pub state: Option<String>,
    pub events: u64,
    pub failures: u64,
}

struct Job {
    event: Arc<BusEvent>,
    reply: oneshot::Sender<Vec<Publication>>,
}

struct Worker {
    name: String,
    jobs: mpsc::UnboundedSender<Job>,
    status: Arc<Mutex<ControllerStatus>>,
}

struct Inputs {
    injector_rx: mpsc::UnboundedReceiver<BusEvent>,
    sink_rx: mpsc::UnboundedReceiver<Publication>,
}

type Writes = Arc<Mutex<Vec<(String, bool)>>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`Master`]
pub struct MasterBuilder {
    context: ControllerContext,
    sink_rx: mpsc::UnboundedReceiver<Publication>,
    extractors: Vec<Box<dyn Extractor>>,
    controllers: Vec<Box<dyn Controller>>,
}

impl MasterBuilder {
    /// Dependencies to construct controllers with
    #[must_use]
    pub fn context(&self) -> &ControllerContext {
        &self.context
    }

    #[must_use]
    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    #[must_use]
    pub fn extractors(mut self, extractors: Vec<Box<dyn Extractor>>) -> Self {
        self.extractors.extend(extractors);
        self
    }

    #[must_use]
    pub fn controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controllers.push(Box::new(controller));
        self
    }

    #[must_use]
    pub fn controllers(mut self, controllers: Vec<Box<dyn Controller>>) -> Self {
        self.controllers.extend(controllers);
        self
    }

    /// Start one worker per controller and return the dispatcher
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build(self) -> Arc<Master> {
        let writes: Writes = Arc::default();
        let recorder = writes.clone();
        self.context.store.register_callback(move |change| {
            lock(&recorder).push((change.key.to_string(), change.value_changed));
        });

        let workers = self.controllers.into_iter().map(spawn_worker).collect();
        let (injector, injector_rx) = mpsc::unbounded_channel();

        Arc::new(Master {
            context: self.context,
            extractors: self.extractors,
            ingest_lock: Mutex::new(()),
            writes,
            workers,
            injector,
            inputs: Mutex::new(Some(Inputs {
                injector_rx,
                sink_rx: self.sink_rx,
            })),
        })
    }
}

fn spawn_worker(controller: Box<dyn Controller>) -> Worker {
    let name = controller.name().to_string();
    let status = Arc::new(Mutex::new(ControllerStatus {
        name: name.clone(),
        initialized: controller.is_initialized(),
        state: controller.state_label(),
        ..ControllerStatus::default()
    }));
    let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
    let controller = Arc::new(tokio::sync::Mutex::new(controller));

    let worker_status = status.clone();
    let worker_name = name.clone();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let controller = controller.clone();
            let event = job.event.clone();

            // Own task per call so a panic only loses this event
            let outcome = tokio::spawn(async move {
                let mut controller = controller.lock().await;
                let mut publications = Vec::new();
                if !controller.is_initialized() {
                    publications.extend(controller.initialize());
                }
                publications.extend(controller.process_event(&event));
                (
                    publications,
                    controller.is_initialized(),
                    controller.state_label(),
                )
            })
            .await;

            let publications = {
                let mut status = lock(&worker_status);
                status.events += 1;
                match outcome {
                    Ok((publications, initialized, state)) => {
                        status.initialized = initialized;
                        status.state = state;
                        publications
                    }
                    Err(e) => {
                        status.failures += 1;
                        tracing::error!(
                            "Controller {} failed on {}: {}",
                            worker_name,
                            job.event.topic,
                            e
                        );
                        Vec::new()
                    }
                }
            };
            let _ = job.reply.send(publications);
        }
        tracing::debug!("Worker for {} stopped", worker_name);
    });

    Worker { name, jobs, status }
}

/// Fans bus events out to extractors, models and controllers
pub struct Master {
    context: ControllerContext,
    extractors: Vec<Box<dyn Extractor>>,
    ingest_lock: Mutex<()>,
    writes: Writes,
    workers: Vec<Worker>,
    injector: mpsc::UnboundedSender<BusEvent>,
    inputs: Mutex<Option<Inputs>>,
}

impl Master {
    /// Start building a dispatcher around `store` and `bayesian`
    ///
    /// `bayesian` must read from `store`.
    #[must_use]
    pub fn builder(
        store: Arc<StateValueMap>,
        bayesian: BayesianEngine,
        shutdown: CancellationToken,
    ) -> MasterBuilder {
        let (sink, sink_rx) = PublicationSink::channel();
        MasterBuilder {
            context: ControllerContext {
                store,
                bayesian: Arc::new(bayesian),
                sink,
                shutdown,
            },
            sink_rx,
            extractors: Vec::new(),
            controllers: Vec::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateValueMap> {
        &self.context.store
    }

    #[must_use]
    pub fn bayesian(&self) -> &Arc<BayesianEngine> {
        &self.context.bayesian
    }

    /// Sender for synthetic events, such as the ticker's
    #[must_use]
    pub fn injector(&self) -> mpsc::UnboundedSender<BusEvent> {
        self.injector.clone()
    }

    /// Status of every controller, in registration order
    #[must_use]
    pub fn controllers(&self) -> Vec<ControllerStatus> {
        self.workers.iter().map(|w| lock(&w.status).clone()).collect()
    }

    /// Run the extractors and the affected models for one event
    pub fn ingest(&self, event: &BusEvent) -> IngestReport {
        let _guard = lock(&self.ingest_lock);
        lock(&self.writes).clear();

        let mut rejected = 0;
        for extractor in &self.extractors {
            if let Err(e) = extractor.extract(event, &self.context.store) {
                tracing::debug!("{} rejected {}: {}", extractor.name(), event.topic, e);
                rejected += 1;
            }
        }

        let writes = std::mem::take(&mut *lock(&self.writes));
        let inferred = self
            .context
            .bayesian
            .reinfer_affected(writes.iter().map(|(key, _)| key.as_str()));
        let derived = std::mem::take(&mut *lock(&self.writes));

        let changed = writes
            .iter()
            .chain(derived.iter())
            .filter(|(_, changed)| *changed)
            .count();
        if changed > 0 {
            tracing::debug!("{} state change(s) after {}", changed, event.topic);
        }

        IngestReport {
            writes: writes.len(),
            changed,
            rejected,
            inferred,
        }
    }

    /// Queue the event on every worker
    fn fan_out(&self, event: &Arc<BusEvent>) -> Vec<oneshot::Receiver<Vec<Publication>>> {
        self.workers
            .iter()
            .filter_map(|worker| {
                let (reply, rx) = oneshot::channel();
                let job = Job {
                    event: Arc::clone(event),
                    reply,
                };
                match worker.jobs.send(job) {
                    Ok(()) => Some(rx),
                    Err(_) => {
                        tracing::error!("Worker for {} is gone", worker.name);
                        None
                    }
                }
            })
            .collect()
    }

    /// Ingest an event and collect what every controller returns
    ///
    /// Publications are concatenated in controller registration order.
    pub async fn dispatch(&self, event: BusEvent) -> Vec<Publication> {
        let event = Arc::new(event);
        self.ingest(&event);
        join_all(self.fan_out(&event))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .flatten()
            .collect()
    }

    fn handle(&self, event: Arc<BusEvent>, publisher: &Publisher) {
        tracing::trace!("Event on {}", event.topic);
        self.ingest(&event);
        for reply in self.fan_out(&event) {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                if let Ok(batch) = reply.await {
                    publisher.emit_all(batch);
                }
            });
        }
    }

    /// Process bus traffic, injected events and background publications
    /// until the shutdown token is cancelled
    ///
    /// Can only be started once.
    pub async fn run(self: Arc<Self>, bus: Arc<dyn MessageBus>) -> Result<(), EngineError> {
        let Inputs {
            mut injector_rx,
            mut sink_rx,
        } = lock(&self.inputs).take().ok_or(EngineError::AlreadyRunning)?;

        let shutdown = self.context.shutdown.clone();
        let mut subscription = bus.subscribe("#")?;
        let publisher = Publisher::new(bus, shutdown.clone());
        tracing::info!("Dispatcher running with {} controllers", self.workers.len());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = subscription.recv() => match received {
                    Ok(event) => self.handle(event, &publisher),
                    Err(e) => {
                        tracing::error!("Bus subscription ended: {}", e);
                        return Err(e.into());
                    }
                },
                Some(event) = injector_rx.recv() => self.handle(Arc::new(event), &publisher),
                Some(publication) = sink_rx.recv() => publisher.emit(publication),
            }
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }
}
