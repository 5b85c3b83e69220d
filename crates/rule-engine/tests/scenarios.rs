//! End-to-end behaviour of the rule set

use bus_protocol::{BusEvent, LocalBus, MessageBus, Payload, Publication, QoS, TimeOfDay};
use observation_store::{Gauges, ManualClock, StateValueMap};
use rule_engine::controllers::door_reminder;
use rule_engine::keys::{self, topics};
use rule_engine::{rules, Controller, EngineConfig, Master};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

const PHONE: &str = "AA:73:49:2B:D8:45";

fn config() -> EngineConfig {
    EngineConfig {
        phone_macs: vec![PHONE.to_string()],
        ..EngineConfig::default()
    }
}

fn engine(clock: Arc<ManualClock>) -> (Arc<Master>, Arc<StateValueMap>) {
    let store = Arc::new(StateValueMap::new(clock));
    let master = rules::build(
        &config(),
        store.clone(),
        &Arc::new(Gauges::new()),
        CancellationToken::new(),
    )
    .unwrap();
    (master, store)
}

fn on_topic<'a>(publications: &'a [Publication], topic: &str) -> Vec<&'a Publication> {
    publications.iter().filter(|p| p.topic == topic).collect()
}

fn state_of(master: &Master, controller: &str) -> Option<String> {
    master
        .controllers()
        .into_iter()
        .find(|c| c.name == controller)
        .and_then(|c| c.state)
}

#[tokio::test]
async fn livingroom_lamp_turns_on_at_night() {
    let (master, _store) = engine(Arc::new(ManualClock::default()));
    let mut lamp = Vec::new();

    let wifi = json!([{ "MacAddress": PHONE, "Interface": "wlan2" }]);
    let out = master.dispatch(BusEvent::new(topics::WIFI_CLIENTS, wifi)).await;
    lamp.extend(on_topic(&out, topics::LIVINGROOM_FLOORLAMP_SET).into_iter().cloned());

    let tick = BusEvent::new(topics::TIME_OF_DAY, Payload::TimeOfDay(TimeOfDay::Nighttime));
    let out = master.dispatch(tick).await;
    lamp.extend(on_topic(&out, topics::LIVINGROOM_FLOORLAMP_SET).into_iter().cloned());

    let presence = BusEvent::new(topics::LIVINGROOM_PRESENCE, json!({ "occupancy": true }));
    let out = master.dispatch(presence).await;
    lamp.extend(on_topic(&out, topics::LIVINGROOM_FLOORLAMP_SET).into_iter().cloned());

    assert_eq!(lamp.len(), 1);
    assert_eq!(lamp[0].payload_text(), r#"{"state":"ON"}"#);
    assert_eq!(lamp[0].qos, QoS::ExactlyOnce);
    assert!(lamp[0].retained);
    assert_eq!(state_of(&master, "livingroom lamp").as_deref(), Some("On"));
}

#[tokio::test]
async fn tv_power_frame_starts_the_tv_bundle() {
    let (master, store) = engine(Arc::new(ManualClock::default()));

    let out = master
        .dispatch(BusEvent::new("cec/message/hex/rx", "01:90:00"))
        .await;
    assert!(store.currently_true(keys::TV_POWER));
    assert_eq!(state_of(&master, "tv").as_deref(), Some("On"));

    let amplifier = on_topic(&out, topics::ROTEL_COMMAND);
    assert_eq!(amplifier.len(), 2);
    assert_eq!(amplifier[0].payload_text(), "power_on!");
    assert_eq!(amplifier[0].wait, Duration::ZERO);
    assert_eq!(amplifier[1].payload_text(), "opt1!");
    assert_eq!(amplifier[1].wait, Duration::from_secs(2));
    assert_eq!(on_topic(&out, topics::TV_LIGHT_SET).len(), 1);
}

#[tokio::test]
async fn presence_belief_rises_and_relaxes() {
    let clock = Arc::new(ManualClock::default());
    let (master, store) = engine(clock.clone());

    master
        .dispatch(BusEvent::new(topics::FREEZER_DOOR, json!({ "contact": false })))
        .await;
    assert!(store.currently_true(keys::AT_HOME));
    assert_eq!(state_of(&master, "presence").as_deref(), Some("Home"));

    // One half-life without re-assertion
    clock.advance(chrono::Duration::minutes(30));
    master
        .dispatch(BusEvent::new(topics::TIME_OF_DAY, Payload::TimeOfDay(TimeOfDay::Daytime)))
        .await;
    assert!(store.currently_false(keys::AT_HOME));
    assert_eq!(state_of(&master, "presence").as_deref(), Some("Away"));
}

#[tokio::test]
async fn kitchen_remote_moves_bluetooth_to_local_sink() {
    let (master, _store) = engine(Arc::new(ManualClock::default()));
    let local_sink = config().kitchen_local_sink;

    let graph = json!({
        "sinks": [{ "index": 0, "name": local_sink }, { "index": 1, "name": "snapcast" }],
        "sinkInputs": [{ "index": 12, "sink": 1, "properties": { "device.api": "bluez" } }]
    });
    let out = master
        .dispatch(BusEvent::new(topics::KITCHEN_PULSEAUDIO_STATE, graph))
        .await;
    // Graph was not cached yet when the controller first initialized
    assert_eq!(on_topic(&out, topics::KITCHEN_PULSEAUDIO_COMMAND).len(), 1);

    let out = master
        .dispatch(BusEvent::new(
            topics::MEDIA_REMOTE_KITCHEN,
            json!({ "action": "dots_2_long_press" }),
        ))
        .await;
    assert_eq!(state_of(&master, "kitchen audio").as_deref(), Some("Local"));

    let moves: Vec<Value> = on_topic(&out, topics::KITCHEN_PULSEAUDIO_COMMAND)
        .into_iter()
        .map(|p| serde_json::from_slice(&p.payload).unwrap())
        .collect();
    assert_eq!(
        moves,
        vec![json!({ "command": "move-sink-input", "sinkInput": 12, "sink": local_sink })]
    );
    let amplifier = on_topic(&out, topics::KITCHEN_AMPLIFIER_COMMAND);
    assert_eq!(amplifier.len(), 1);
    assert_eq!(amplifier[0].payload_text(), r#"{"input":"local"}"#);
}

/// Dispatcher running on a local bus with a single reminder controller
fn reminder_engine(
    clock: Arc<ManualClock>,
    which: usize,
) -> (Arc<Master>, Arc<LocalBus>, CancellationToken) {
    let config = config();
    let shutdown = CancellationToken::new();
    let store = Arc::new(StateValueMap::new(clock));
    let bayesian = rules::bayesian_engine(store.clone(), &config);
    let builder = Master::builder(store, bayesian, shutdown.clone())
        .extractors(rules::extractors(&config, &Arc::new(Gauges::new())).unwrap());
    let reminder = door_reminder(builder.context(), &config.door_reminders[which]);
    let master = builder.controller(reminder).build();

    let bus = Arc::new(LocalBus::new());
    tokio::spawn(master.clone().run(bus.clone()));
    (master, bus, shutdown)
}

/// Let every task run until it waits on something
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn freezer_door_reminds_then_goes_quiet() {
    let clock = Arc::new(ManualClock::default());
    let (master, bus, shutdown) = reminder_engine(clock.clone(), 0);
    let reminder = config().door_reminders[0].clone();
    let mut telegram = bus.subscribe(&reminder.topic).unwrap();
    settle().await;

    bus.publish(&Publication::json(topics::FREEZER_DOOR, &json!({ "contact": false })))
        .unwrap();
    settle().await;

    clock.advance(chrono::Duration::seconds(reminder.open_long_limit_secs as i64 + 1));
    master
        .injector()
        .send(BusEvent::new(topics::TIME_OF_DAY, Payload::TimeOfDay(TimeOfDay::Daytime)))
        .unwrap();

    for _ in 0..reminder.max_reminders {
        let event = timeout(reminder.period() * 2, telegram.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.payload.to_text_lossy(), reminder.message);
    }
    assert!(timeout(reminder.period() * 10, telegram.recv()).await.is_err());
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn freezer_closed_in_time_sends_no_reminder() {
    let clock = Arc::new(ManualClock::default());
    let (master, bus, shutdown) = reminder_engine(clock.clone(), 0);
    let reminder = config().door_reminders[0].clone();
    let mut telegram = bus.subscribe(&reminder.topic).unwrap();
    settle().await;

    bus.publish(&Publication::json(topics::FREEZER_DOOR, &json!({ "contact": false })))
        .unwrap();
    settle().await;
    clock.advance(chrono::Duration::seconds(10));
    bus.publish(&Publication::json(topics::FREEZER_DOOR, &json!({ "contact": true })))
        .unwrap();
    settle().await;

    clock.advance(chrono::Duration::seconds(reminder.open_long_limit_secs as i64 * 2));
    master
        .injector()
        .send(BusEvent::new(topics::TIME_OF_DAY, Payload::TimeOfDay(TimeOfDay::Daytime)))
        .unwrap();
    assert!(timeout(reminder.period() * 10, telegram.recv()).await.is_err());
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn low_battery_reminds_after_the_limit() {
    let clock = Arc::new(ManualClock::default());
    let (master, bus, shutdown) = reminder_engine(clock.clone(), 1);
    let reminder = config().door_reminders[1].clone();
    assert_eq!(reminder.key, keys::FREEZER_DOOR_BATTERY_LOW);
    let mut telegram = bus.subscribe(&reminder.topic).unwrap();
    settle().await;

    bus.publish(&Publication::json(
        topics::FREEZER_DOOR,
        &json!({ "contact": true, "battery": 12 }),
    ))
    .unwrap();
    settle().await;
    assert!(master.store().currently_true(keys::FREEZER_DOOR_BATTERY_LOW));

    clock.advance(chrono::Duration::seconds(reminder.open_long_limit_secs as i64 + 1));
    master
        .injector()
        .send(BusEvent::new(topics::TIME_OF_DAY, Payload::TimeOfDay(TimeOfDay::Daytime)))
        .unwrap();

    let event = timeout(Duration::from_secs(5), telegram.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload.to_text_lossy(), reminder.message);
    shutdown.cancel();
}

/// Returns a fixed batch on every event it did not cause itself
struct Batch(Vec<Publication>);

impl Controller for Batch {
    fn name(&self) -> &str {
        "batch"
    }
    fn is_initialized(&self) -> bool {
        true
    }
    fn initialize(&mut self) -> Vec<Publication> {
        Vec::new()
    }
    fn process_event(&mut self, event: &BusEvent) -> Vec<Publication> {
        if event.topic == "go" {
            self.0.clone()
        } else {
            Vec::new()
        }
    }
}

fn batch_engine(batch: Vec<Publication>) -> (Arc<Master>, Arc<LocalBus>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let store = Arc::new(StateValueMap::default());
    let bayesian = rules::bayesian_engine(store.clone(), &EngineConfig::default());
    let master = Master::builder(store, bayesian, shutdown.clone())
        .controller(Batch(batch))
        .build();
    let bus = Arc::new(LocalBus::new());
    tokio::spawn(master.clone().run(bus.clone()));
    (master, bus, shutdown)
}

#[tokio::test(start_paused = true)]
async fn delayed_publication_arrives_after_its_wait() {
    let (master, bus, shutdown) = batch_engine(vec![
        Publication::new("out/now", "1"),
        Publication::new("out/later", "2").with_wait(Duration::from_secs(2)),
    ]);
    let mut out = bus.subscribe("out/#").unwrap();
    master.injector().send(BusEvent::new("go", "")).unwrap();

    let first = out.recv().await.unwrap();
    let first_at = Instant::now();
    let second = out.recv().await.unwrap();
    assert_eq!(first.topic, "out/now");
    assert_eq!(second.topic, "out/later");
    assert!(first_at.elapsed() >= Duration::from_secs(2));
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn zero_wait_publication_precedes_delayed_ones() {
    let (master, bus, shutdown) = batch_engine(vec![
        Publication::new("out/a", "0"),
        Publication::new("out/b", "2").with_wait(Duration::from_secs(2)),
        Publication::new("out/c", "2").with_wait(Duration::from_secs(2)),
    ]);
    let mut out = bus.subscribe("out/#").unwrap();
    master.injector().send(BusEvent::new("go", "")).unwrap();

    assert_eq!(out.recv().await.unwrap().topic, "out/a");
    let mut rest = vec![
        out.recv().await.unwrap().topic.clone(),
        out.recv().await.unwrap().topic.clone(),
    ];
    rest.sort();
    assert_eq!(rest, vec!["out/b", "out/c"]);
    shutdown.cancel();
}

#[tokio::test]
async fn system_clock_store_works_with_full_rule_set() {
    let store = Arc::new(StateValueMap::default());
    let before = store.now();
    let master = rules::build(
        &EngineConfig::default(),
        store.clone(),
        &Arc::new(Gauges::new()),
        CancellationToken::new(),
    )
    .unwrap();
    master
        .dispatch(BusEvent::new(topics::MPD_STATUS, json!({ "state": "play" })))
        .await;
    let record = store.get(keys::MPD_PLAY).unwrap();
    assert!(record.value);
    assert!(record.first_seen >= before);
    assert!(master.controllers().iter().all(|c| c.events == 1));
}

#[tokio::test]
async fn blinds_are_scheduled_before_any_event() {
    let (master, _store) = engine(Arc::new(ManualClock::default()));
    let blinds = master
        .controllers()
        .into_iter()
        .find(|c| c.name == "bedroom blinds")
        .unwrap();
    assert!(blinds.initialized);
    assert_eq!(blinds.events, 0);
    assert_eq!(blinds.state.as_deref(), Some("4 jobs scheduled"));
}
