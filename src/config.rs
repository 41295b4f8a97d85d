use serde_derive::{Deserialize, Serialize};

use crate::math::RelativeOffset;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackDatasetConfig {
    /// Placed between the pre-cut id and the crossing counter of a fragment id
    pub cut_id_separator: String,
    /// Used for sections without an offset for the requested event type
    pub default_offset: RelativeOffset,
}

impl TrackDatasetConfig {
    pub fn new(cut_id_separator: impl Into<String>, default_offset: RelativeOffset) -> Self {
        Self {
            cut_id_separator: cut_id_separator.into(),
            default_offset,
        }
    }
}

impl Default for TrackDatasetConfig {
    fn default() -> Self {
        Self::new("_", RelativeOffset::BOTTOM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: TrackDatasetConfig =
            serde_json::from_str(r#"{ "cut_id_separator": "-" }"#).unwrap();

        assert_eq!(config.cut_id_separator, "-");
        assert_eq!(config.default_offset, RelativeOffset::BOTTOM);
    }

    #[test]
    fn offsets_are_validated_while_parsing() {
        let config: TrackDatasetConfig =
            serde_json::from_str(r#"{ "default_offset": [0.5, 0.5] }"#).unwrap();
        assert_eq!(config.default_offset, RelativeOffset::CENTER);

        let res = serde_json::from_str::<TrackDatasetConfig>(r#"{ "default_offset": [2.0, 0.5] }"#);
        assert!(res.is_err());
    }
}
