use chrono::{DateTime, Utc};

use crate::storage::models::Measurement;

pub trait DataFormatter: Send + Sync {
    fn format(&self, timestamp: DateTime<Utc>, measurements: &[Measurement]) -> String;
}

/// Human-readable listing grouped by sensor address.
pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format(&self, timestamp: DateTime<Utc>, measurements: &[Measurement]) -> String {
        let mut output = format!("🚀 Sensor values - {}\n", timestamp.format("%Y-%m-%d %H:%M:%S"));

        // Group by id, keeping the order in which sensors first appear.
        let mut ids: Vec<u8> = Vec::new();
        for m in measurements {
            if !ids.contains(&m.id) {
                ids.push(m.id);
            }
        }

        for id in ids {
            let group: Vec<&Measurement> = measurements.iter().filter(|m| m.id == id).collect();
            output.push_str(&format!("Sensor ID {} ({}):\n", id, group[0].category));
            for m in group {
                for (name, unit, value) in m.outputs() {
                    output.push_str(&format!(" - {}: {} {}\n", name, value, unit));
                }
            }
        }
        output
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format(&self, timestamp: DateTime<Utc>, measurements: &[Measurement]) -> String {
        let result = serde_json::json!({
            "timestamp": timestamp.to_rfc3339(),
            "measurements": measurements,
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement(id: u8, category: &str, names: &[&str], unit: &str, value: f64) -> Measurement {
        Measurement {
            id,
            output_names: names.iter().map(|s| s.to_string()).collect(),
            category: category.to_string(),
            units: names.iter().map(|_| unit.to_string()).collect(),
            value,
            field_types: names.iter().map(|_| "REAL".to_string()).collect(),
        }
    }

    #[test]
    fn console_groups_by_sensor() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let measurements = vec![
            measurement(5, "temperature", &["temp_c"], "C", 21.5),
            measurement(7, "voltage", &["v1", "v2"], "V", 12.5),
            measurement(5, "temperature", &["temp_raw"], "C", 215.0),
        ];

        let text = ConsoleFormatter.format(ts, &measurements);

        assert_eq!(
            text,
            "🚀 Sensor values - 2024-05-01 08:30:00\n\
             Sensor ID 5 (temperature):\n \
             - temp_c: 21.5 C\n \
             - temp_raw: 215 C\n\
             Sensor ID 7 (voltage):\n \
             - v1: 12.5 V\n \
             - v2: 12.5 V\n"
        );
    }

    #[test]
    fn json_lists_measurements() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let text = JsonFormatter.format(ts, &[measurement(5, "temperature", &["temp_c"], "C", 21.5)]);

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["timestamp"], "2024-05-01T08:30:00+00:00");
        assert_eq!(parsed["measurements"][0]["value"], 21.5);
        assert_eq!(parsed["measurements"][0]["output_names"][0], "temp_c");
    }
}
