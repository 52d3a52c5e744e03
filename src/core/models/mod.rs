pub mod alert;
pub mod burn_rate;
pub mod credits;
pub mod prediction;
pub mod token;
pub mod usage;

/// Serde adapter storing a `chrono::Duration` as whole seconds.
pub mod duration_secs {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn from_secs<E: Error>(secs: i64) -> Result<Duration, E> {
        Duration::try_seconds(secs).ok_or_else(|| E::custom("duration out of range"))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        from_secs(secs)
    }
}

/// Same as [`duration_secs`] for optional durations.
pub mod option_duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<i64>::deserialize(deserializer)?;
        secs.map(super::duration_secs::from_secs).transpose()
    }
}
