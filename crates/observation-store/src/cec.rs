//! HDMI-CEC frame table
//!
//! The CEC bridge publishes every frame it sees as colon-separated hex on
//! `cec/message/hex/rx` (received) and `cec/message/hex/tx` (sent). A closed
//! set of frames maps to propositions; anything else is ignored.

use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::store::StateValueMap;
use bus_protocol::BusEvent;

pub const TOPIC_RX: &str = "cec/message/hex/rx";
pub const TOPIC_TX: &str = "cec/message/hex/tx";

pub const TV_POWER: &str = "tvPower";
pub const SOURCE_TV: &str = "cecSourceTv";
pub const SOURCE_RECORDER: &str = "cecSourceRecorder";
pub const SOURCE_PLAYBACK_1: &str = "cecSourcePlayback1";
pub const SOURCE_PLAYBACK_2: &str = "cecSourcePlayback2";

/// All active-source propositions; exactly one is true after a source frame
pub const SOURCES: [&str; 4] = [
    SOURCE_TV,
    SOURCE_RECORDER,
    SOURCE_PLAYBACK_1,
    SOURCE_PLAYBACK_2,
];

/// What a recognised frame means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CecMeaning {
    /// Report Power Status from the TV
    TvPower(bool),
    /// Active Source broadcast
    ActiveSource(&'static str),
}

/// Frame prefixes and their meaning, checked in order
const FRAME_TABLE: &[(&str, CecMeaning)] = &[
    ("01:90:00", CecMeaning::TvPower(true)),
    ("01:90:01", CecMeaning::TvPower(false)),
    ("0F:82:00:00", CecMeaning::ActiveSource(SOURCE_TV)),
    ("1F:82:40", CecMeaning::ActiveSource(SOURCE_RECORDER)),
    ("8F:82:30", CecMeaning::ActiveSource(SOURCE_PLAYBACK_2)),
    ("4F:82:20", CecMeaning::ActiveSource(SOURCE_PLAYBACK_1)),
];

/// Look up a hex frame in the table
#[must_use]
pub fn classify(frame: &str) -> Option<CecMeaning> {
    let frame = frame.trim().to_ascii_uppercase();
    FRAME_TABLE
        .iter()
        .find(|(prefix, _)| frame.starts_with(prefix))
        .map(|(_, meaning)| *meaning)
}

/// Extractor for both CEC frame topics
#[derive(Debug, Default)]
pub struct CecExtractor;

impl CecExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for CecExtractor {
    fn name(&self) -> &str {
        "cec frames"
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != TOPIC_RX && event.topic != TOPIC_TX {
            return Ok(());
        }

        let frame = event.payload.text()?;
        match classify(&frame) {
            Some(CecMeaning::TvPower(on)) => {
                store.set(TV_POWER, on);
            }
            Some(CecMeaning::ActiveSource(active)) => {
                for source in SOURCES {
                    store.set(source, source == active);
                }
            }
            None => tracing::trace!("Ignoring CEC frame {}", frame),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_frames() {
        assert_eq!(classify("01:90:00"), Some(CecMeaning::TvPower(true)));
        assert_eq!(classify("01:90:01:ff"), Some(CecMeaning::TvPower(false)));
        assert_eq!(classify("0f:82:00:00"), Some(CecMeaning::ActiveSource(SOURCE_TV)));
        assert_eq!(classify("4F:82:20:00"), Some(CecMeaning::ActiveSource(SOURCE_PLAYBACK_1)));
        assert_eq!(classify("0F:87:00:00:F0"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_power_frame_sets_tv_power() {
        let store = StateValueMap::default();
        CecExtractor
            .extract(&BusEvent::new(TOPIC_RX, "01:90:00"), &store)
            .unwrap();
        assert!(store.currently_true(TV_POWER));

        CecExtractor
            .extract(&BusEvent::new(TOPIC_TX, "01:90:01"), &store)
            .unwrap();
        assert!(store.currently_false(TV_POWER));
    }

    #[test]
    fn test_active_source_is_exclusive() {
        let store = StateValueMap::default();
        CecExtractor
            .extract(&BusEvent::new(TOPIC_RX, "8F:82:30:00"), &store)
            .unwrap();
        assert!(store.currently_true(SOURCE_PLAYBACK_2));
        assert!(store.currently_false(SOURCE_TV));
        assert!(store.currently_false(SOURCE_RECORDER));
        assert!(store.currently_false(SOURCE_PLAYBACK_1));
    }

    #[test]
    fn test_unknown_frames_write_nothing() {
        let store = StateValueMap::default();
        CecExtractor
            .extract(&BusEvent::new(TOPIC_RX, "10:8F"), &store)
            .unwrap();
        assert!(store.is_empty());
    }
}
