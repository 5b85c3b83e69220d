//! Kitchen audio: routes the Bluetooth stream to the local or house sink

use crate::backoff::Backoff;
use crate::controller::{ControllerContext, MachineController};
use crate::error::ActionError;
use crate::keys::{self, topics};
use crate::machine::StateMachine;
use bus_protocol::{BusEvent, Publication, QoS};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Property the audio server sets on Bluetooth streams
const BLUETOOTH_API: (&str, &str) = ("device.api", "bluez");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitchenAudioState {
    /// Bluetooth audio plays on the kitchen's own speakers
    Local,
    /// Bluetooth audio is streamed to the rest of the house
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sink {
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkInput {
    pub index: u32,
    pub sink: u32,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl SinkInput {
    #[must_use]
    pub fn is_bluetooth(&self) -> bool {
        self.properties.get(BLUETOOTH_API.0).map(String::as_str) == Some(BLUETOOTH_API.1)
    }
}

/// Sinks and streams as reported on `kitchen/pulseaudio/state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioGraph {
    #[serde(default)]
    pub sinks: Vec<Sink>,
    #[serde(default)]
    pub sink_inputs: Vec<SinkInput>,
}

impl AudioGraph {
    #[must_use]
    pub fn bluetooth_input(&self) -> Option<&SinkInput> {
        self.sink_inputs.iter().find(|i| i.is_bluetooth())
    }

    #[must_use]
    pub fn sink_index(&self, name: &str) -> Option<u32> {
        self.sinks.iter().find(|s| s.name == name).map(|s| s.index)
    }

    /// Whether the Bluetooth stream currently plays on `sink`
    #[must_use]
    pub fn bluetooth_on(&self, sink: &str) -> bool {
        match (self.bluetooth_input(), self.sink_index(sink)) {
            (Some(input), Some(index)) => input.sink == index,
            _ => false,
        }
    }
}

type SharedGraph = Arc<Mutex<Option<AudioGraph>>>;

fn probe() -> Publication {
    Publication::json(
        topics::KITCHEN_PULSEAUDIO_COMMAND,
        &json!({ "command": "refresh" }),
    )
}

fn route(graph: &SharedGraph, sink: &str, amplifier_input: &str) -> Result<Vec<Publication>, ActionError> {
    let graph = graph.lock().unwrap_or_else(PoisonError::into_inner);
    let graph = graph
        .as_ref()
        .ok_or_else(|| ActionError::Precondition("audio graph not known yet".to_string()))?;
    let input = graph
        .bluetooth_input()
        .ok_or_else(|| ActionError::Precondition("no bluetooth sink input".to_string()))?;

    Ok(vec![
        Publication::json(
            topics::KITCHEN_PULSEAUDIO_COMMAND,
            &json!({ "command": "move-sink-input", "sinkInput": input.index, "sink": sink }),
        )
        .with_qos(QoS::ExactlyOnce),
        Publication::command(
            topics::KITCHEN_AMPLIFIER_COMMAND,
            &json!({ "input": amplifier_input }),
        ),
    ])
}

fn cache_graph(graph: &SharedGraph, event: &BusEvent) {
    if event.topic != topics::KITCHEN_PULSEAUDIO_STATE {
        return;
    }
    let parsed = event
        .payload
        .json()
        .map_err(|e| e.to_string())
        .and_then(|doc| serde_json::from_value::<AudioGraph>(doc.into_owned()).map_err(|e| e.to_string()));
    match parsed {
        Ok(new_graph) => {
            tracing::trace!(
                "kitchen audio: {} sinks, {} inputs",
                new_graph.sinks.len(),
                new_graph.sink_inputs.len()
            );
            *graph.lock().unwrap_or_else(PoisonError::into_inner) = Some(new_graph);
        }
        Err(e) => tracing::debug!("kitchen audio: ignoring malformed audio graph: {}", e),
    }
}

#[must_use]
pub fn kitchen_audio(
    ctx: &ControllerContext,
    local_sink: &str,
    remote_sink: &str,
) -> MachineController<KitchenAudioState> {
    let graph: SharedGraph = Arc::default();

    let mut machine = StateMachine::new("kitchen audio", ctx.store.clone());
    let (g, sink) = (graph.clone(), local_sink.to_string());
    machine.on_entry(KitchenAudioState::Local, move |_| route(&g, &sink, "local"));
    let (g, sink) = (graph.clone(), remote_sink.to_string());
    machine.on_entry(KitchenAudioState::Remote, move |_| route(&g, &sink, "snapcast"));
    machine
        .permit(KitchenAudioState::Remote, KitchenAudioState::Local, |s| {
            s.currently_true(keys::KITCHEN_REMOTE_LOCAL)
        })
        .permit(KitchenAudioState::Local, KitchenAudioState::Remote, |s| {
            s.currently_true(keys::KITCHEN_REMOTE_REMOTE)
        });

    let (g, sink) = (graph.clone(), local_sink.to_string());
    let mut backoff = Backoff::default();
    let mut controller = MachineController::new(machine, move |machine| {
        let on_local = g
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|graph| graph.bluetooth_on(&sink));
        match on_local {
            Some(on_local) => {
                backoff.reset();
                machine.initialize(if on_local {
                    KitchenAudioState::Local
                } else {
                    KitchenAudioState::Remote
                });
                Vec::new()
            }
            None if backoff.attempt() => {
                tracing::debug!("kitchen audio: probing audio graph");
                vec![probe()]
            }
            None => Vec::new(),
        }
    });
    controller.add_handler(move |event, _outbox| cache_graph(&graph, event));
    controller
}
