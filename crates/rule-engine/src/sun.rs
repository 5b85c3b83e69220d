//! Solar time-of-day phases
//!
//! Uses the sunrise equation (J2000 epoch, observer at sea level) to find
//! the moments the sun crosses -18, -12, -6 and -0.833 degrees on a given
//! date, and places an instant among them.

use bus_protocol::TimeOfDay;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const OBLIQUITY_DEG: f64 = 23.4397;
/// 2000-01-01 counted from 0001-01-01 as day 1
const J2000_DAYS_FROM_CE: i32 = 730_120;

/// Solar elevations with the phase that begins when the sun rises through
/// them and the phase that begins when it sets through them
const THRESHOLDS: [(f64, TimeOfDay, TimeOfDay); 4] = [
    (
        -18.0,
        TimeOfDay::MorningAstronomicalTwilight,
        TimeOfDay::Nighttime,
    ),
    (
        -12.0,
        TimeOfDay::MorningNauticalTwilight,
        TimeOfDay::EveningAstronomicalTwilight,
    ),
    (
        -6.0,
        TimeOfDay::MorningCivilTwilight,
        TimeOfDay::EveningNauticalTwilight,
    ),
    (-0.833, TimeOfDay::Daytime, TimeOfDay::EveningCivilTwilight),
];

/// Position on earth, degrees (north and east positive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
}

impl Observer {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Solar transit and declination for one date
struct SolarDay {
    transit_jd: f64,
    declination: f64,
}

impl SolarDay {
    fn compute(date: NaiveDate, observer: Observer) -> Self {
        let n = f64::from(date.num_days_from_ce() - J2000_DAYS_FROM_CE);
        let mean_noon = n - observer.longitude / 360.0;

        let anomaly = (357.5291 + 0.985_600_28 * mean_noon).rem_euclid(360.0);
        let m = anomaly.to_radians();
        let center = 1.9148 * m.sin() + 0.0200 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();
        let ecliptic_longitude = (anomaly + center + 180.0 + 102.9372)
            .rem_euclid(360.0)
            .to_radians();

        let transit_jd =
            J2000 + mean_noon + 0.0053 * m.sin() - 0.0069 * (2.0 * ecliptic_longitude).sin();
        let declination = (ecliptic_longitude.sin() * OBLIQUITY_DEG.to_radians().sin()).asin();

        Self {
            transit_jd,
            declination,
        }
    }

    /// Rise and set through `elevation`, or `None` if the sun never crosses it
    fn crossings(&self, elevation: f64, latitude: f64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let phi = latitude.to_radians();
        let cos_hour_angle = (elevation.to_radians().sin() - phi.sin() * self.declination.sin())
            / (phi.cos() * self.declination.cos());
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            return None;
        }
        let half_day = cos_hour_angle.acos().to_degrees() / 360.0;
        Some((
            jd_to_utc(self.transit_jd - half_day)?,
            jd_to_utc(self.transit_jd + half_day)?,
        ))
    }

    /// Elevation at solar noon, degrees
    fn noon_elevation(&self, latitude: f64) -> f64 {
        90.0 - (latitude - self.declination.to_degrees()).abs()
    }
}

fn jd_to_utc(jd: f64) -> Option<DateTime<Utc>> {
    let millis = ((jd - UNIX_EPOCH_JD) * 86_400_000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// Phase boundaries for `date`, in chronological order
///
/// Each entry is the instant a phase begins. Crossings that do not happen
/// on that date are left out.
#[must_use]
pub fn thresholds(date: NaiveDate, observer: Observer) -> Vec<(DateTime<Utc>, TimeOfDay)> {
    let day = SolarDay::compute(date, observer);
    let mut events: Vec<(DateTime<Utc>, TimeOfDay)> = THRESHOLDS
        .iter()
        .filter_map(|(elevation, rising, setting)| {
            day.crossings(*elevation, observer.latitude)
                .map(|(rise, set)| [(rise, *rising), (set, *setting)])
        })
        .flatten()
        .collect();
    events.sort_by_key(|(at, _)| *at);
    events
}

/// Time-of-day phase of `now`, using the thresholds of the local `date`
///
/// Before the first and after the last threshold it is night. When the sun
/// crosses none of the thresholds the phase is decided by whether it is up
/// at noon.
#[must_use]
pub fn phase_at(now: DateTime<Utc>, date: NaiveDate, observer: Observer) -> TimeOfDay {
    let events = thresholds(date, observer);
    if events.is_empty() {
        let day = SolarDay::compute(date, observer);
        return if day.noon_elevation(observer.latitude) > THRESHOLDS[3].0 {
            TimeOfDay::Daytime
        } else {
            TimeOfDay::Nighttime
        };
    }

    match events.iter().rposition(|(at, _)| *at <= now) {
        Some(i) if i + 1 < events.len() => events[i].1,
        _ => TimeOfDay::Nighttime,
    }
}

/// Time-of-day phase of `now` for the system's local date
#[must_use]
pub fn current_phase(now: DateTime<Utc>, observer: Observer) -> TimeOfDay {
    let date = now.with_timezone(&chrono::Local).date_naive();
    phase_at(now, date, observer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STOCKHOLM: Observer = Observer {
        latitude: 59.3293,
        longitude: 18.0686,
    };

    fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn test_equinox_phases_in_stockholm() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let cases = [
            (0, 0, TimeOfDay::Nighttime),
            (2, 50, TimeOfDay::MorningAstronomicalTwilight),
            (3, 40, TimeOfDay::MorningNauticalTwilight),
            (4, 30, TimeOfDay::MorningCivilTwilight),
            (11, 0, TimeOfDay::Daytime),
            (17, 20, TimeOfDay::EveningCivilTwilight),
            (18, 0, TimeOfDay::EveningNauticalTwilight),
            (19, 0, TimeOfDay::EveningAstronomicalTwilight),
            (20, 0, TimeOfDay::Nighttime),
        ];
        for (h, m, expected) in cases {
            assert_eq!(phase_at(at(date, h, m), date, STOCKHOLM), expected, "{h:02}:{m:02}");
        }
    }

    #[test]
    fn test_equinox_thresholds() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let events = thresholds(date, STOCKHOLM);
        assert_eq!(events.len(), 8);
        let sunrise = events
            .iter()
            .find(|(_, p)| *p == TimeOfDay::Daytime)
            .unwrap()
            .0;
        assert!(sunrise > at(date, 4, 40) && sunrise < at(date, 5, 0));
    }

    #[test]
    fn test_missing_thresholds_are_omitted() {
        // No astronomical or nautical night in Stockholm at midsummer
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let events = thresholds(date, STOCKHOLM);
        assert_eq!(events.len(), 4);
        assert_eq!(phase_at(at(date, 12, 0), date, STOCKHOLM), TimeOfDay::Daytime);
        assert_eq!(phase_at(at(date, 22, 0), date, STOCKHOLM), TimeOfDay::Nighttime);
    }

    #[test]
    fn test_polar_day_and_night() {
        let longyearbyen = Observer::new(78.22, 15.65);
        let midsummer = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        assert!(thresholds(midsummer, longyearbyen).is_empty());
        assert_eq!(
            phase_at(at(midsummer, 0, 0), midsummer, longyearbyen),
            TimeOfDay::Daytime
        );

        // The sun climbs just above -12 degrees around noon
        let midwinter = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        assert_eq!(thresholds(midwinter, longyearbyen).len(), 4);
        assert_eq!(
            phase_at(at(midwinter, 10, 30), midwinter, longyearbyen),
            TimeOfDay::MorningNauticalTwilight
        );
        assert_eq!(
            phase_at(at(midwinter, 20, 0), midwinter, longyearbyen),
            TimeOfDay::Nighttime
        );
    }
}
