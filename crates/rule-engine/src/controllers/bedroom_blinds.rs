//! Bedroom blinds on a fixed daily schedule

use crate::config::BlindsConfig;
use crate::controller::{Controller, ControllerContext};
use crate::error::EngineError;
use crate::scheduler::{self, Scheduler};
use bus_protocol::{BusEvent, Publication};
use serde_json::json;
use std::sync::Arc;

/// Opens, closes and refreshes the blinds from the wall clock; bus events
/// play no part
pub struct BedroomBlinds {
    scheduler: Scheduler,
}

impl BedroomBlinds {
    /// Start the scheduled jobs
    ///
    /// Fails if any of the cron expressions is invalid, in which case
    /// nothing is scheduled. Must be called from within a tokio runtime.
    pub fn new(ctx: &ControllerContext, config: &BlindsConfig) -> Result<Self, EngineError> {
        let set_topic = format!("zigbee2mqtt/{}/set", config.device);
        let get_topic = format!("zigbee2mqtt/{}/get", config.device);

        let mut jobs = vec![
            (
                "blinds open".to_string(),
                scheduler::parse(&config.open)?,
                Publication::command(&set_topic, &json!({ "state": "OPEN" })),
            ),
            (
                "blinds close".to_string(),
                scheduler::parse(&config.close)?,
                Publication::command(&set_topic, &json!({ "state": "CLOSE" })),
            ),
        ];
        for (i, expression) in config.refresh.iter().enumerate() {
            jobs.push((
                format!("blinds refresh {}", i + 1),
                scheduler::parse(expression)?,
                Publication::json(&get_topic, &json!({ "position": "" })),
            ));
        }

        let scheduler = Scheduler::new(ctx.shutdown.clone());
        for (name, schedule, publication) in jobs {
            let sink = ctx.sink.clone();
            scheduler.schedule_cron(
                &name,
                schedule,
                Arc::new(move || {
                    sink.publish(publication.clone());
                }),
            );
        }
        Ok(Self { scheduler })
    }
}

impl Controller for BedroomBlinds {
    fn name(&self) -> &str {
        "bedroom blinds"
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn initialize(&mut self) -> Vec<Publication> {
        Vec::new()
    }

    fn process_event(&mut self, _event: &BusEvent) -> Vec<Publication> {
        Vec::new()
    }

    fn state_label(&self) -> Option<String> {
        Some(format!("{} jobs scheduled", self.scheduler.active_count()))
    }
}
