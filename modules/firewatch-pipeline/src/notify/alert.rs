use std::collections::BTreeMap;

use firewatch_common::FireEvent;

pub const ALERT_TITLE: &str = "Wildfire alert";

/// Human-readable alert plus structured fields for one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Alert {
    pub fn for_event(event: &FireEvent, distance_m: f64) -> Self {
        let distance_km = (distance_m / 1000.0).round() as i64;
        let body = format!("A wildfire was detected {distance_km} km from your location.");

        let data = BTreeMap::from([
            ("event_id".to_string(), event.id.to_string()),
            ("distance_km".to_string(), distance_km.to_string()),
            ("latitude".to_string(), event.detection.latitude.to_string()),
            ("longitude".to_string(), event.detection.longitude.to_string()),
            ("acq_date".to_string(), event.detection.acq_date.to_string()),
        ]);

        Self {
            title: ALERT_TITLE.to_string(),
            body,
            data,
        }
    }
}
