use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single weather reading.
///
/// Every field defaults when missing from a JSON payload or set to `null`,
/// so a decoded observation always carries a complete record. The `id` is
/// owned by the store and ignored on input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pressure: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub wind: Wind,
    #[serde(deserialize_with = "null_as_default")]
    pub weather_status: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(deserialize_with = "null_as_default")]
    pub latitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub longitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wind {
    #[serde(deserialize_with = "null_as_default")]
    pub speed: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub direction: f64,
}

/// Reads `null` as the field's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Observation {
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_decode_to_defaults() {
        let ob: Observation = serde_json::from_str(r#"{"temperature":25.5,"humidity":80}"#).unwrap();
        assert_eq!(ob.temperature, 25.5);
        assert_eq!(ob.humidity, 80.0);
        assert_eq!(ob.pressure, 0.0);
        assert_eq!(ob.location, Location::default());
        assert_eq!(ob.wind, Wind::default());
        assert_eq!(ob.timestamp, DateTime::<Utc>::default());
        assert!(ob.weather_status.is_empty());
    }

    #[test]
    fn nested_shape_on_the_wire() {
        let ob = Observation {
            location: Location {
                city: "Berlin".into(),
                country: "Germany".into(),
                ..Location::default()
            },
            wind: Wind { speed: 3.5, direction: 270.0 },
            weather_status: "Clear".into(),
            ..Observation::default()
        }
        .with_id(7);

        let value = serde_json::to_value(&ob).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["location"]["city"], "Berlin");
        assert_eq!(value["wind"]["direction"], 270.0);
        assert_eq!(value["weather_status"], "Clear");
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn null_fields_decode_to_defaults() {
        let ob: Observation = serde_json::from_str(
            r#"{"temperature":null,"humidity":80,"location":{"city":null,"latitude":1.5},"wind":null,"timestamp":null}"#,
        )
        .unwrap();
        assert_eq!(ob.temperature, 0.0);
        assert_eq!(ob.humidity, 80.0);
        assert_eq!(ob.location.latitude, 1.5);
        assert!(ob.location.city.is_empty());
        assert_eq!(ob.wind, Wind::default());
        assert_eq!(ob.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let ob: Observation = serde_json::from_str(r#"{"pressure":1013,"station":"x"}"#).unwrap();
        assert_eq!(ob.pressure, 1013.0);
    }
}
