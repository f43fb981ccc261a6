use chrono::NaiveDateTime;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

/// Wire format for every timestamp the service exposes.
pub const FORMAT: &str = "%Y-%m-%d %H:%M";

/// Serializer for serde to write a civil `NaiveDateTime` as `YYYY-MM-DD HH:MM`.
/// Used from struct fields through a serde `with` attribute pointing to this module.
pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&ts.format(FORMAT))
}

pub fn deserialize<'de, D>(d: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    parse(&raw).map_err(D::Error::custom)
}

pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Item {
        #[serde(with = "super")]
        x: chrono::NaiveDateTime,
    }

    #[test]
    fn writes_minute_precision() {
        let x = super::parse("2024-01-01 06:15").unwrap();
        assert_eq!(serde_json::to_string(&Item { x }).unwrap(), r#"{"x":"2024-01-01 06:15"}"#);
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(serde_json::from_str::<Item>(r#"{"x":"2024-01-01T06:15:00"}"#).is_err());
    }
}
