use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static per-(table, store) clock-skew table, in minutes.
///
/// Sensor controllers drift; operations measures the skew per store and
/// records it here so the transform stage can subtract it. A store with no
/// entry is assumed to be on time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOffsets(HashMap<String, HashMap<i64, i64>>);

impl TimeOffsets {
    pub fn new(offsets: HashMap<String, HashMap<i64, i64>>) -> Self {
        Self(offsets)
    }

    /// Offset map for one source table key, if any store has an entry.
    pub fn for_table(&self, table_key: &str) -> Option<&HashMap<i64, i64>> {
        self.0.get(table_key)
    }

    /// Minutes of skew for one store in one table. Missing entries are 0.
    pub fn minutes_for(&self, table_key: &str, store_id: i64) -> i64 {
        self.0
            .get(table_key)
            .and_then(|stores| stores.get(&store_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_defaults_to_zero() {
        let yaml = r#"
traffic_log:
  1: 5
  2: -10
"#;
        let offsets: TimeOffsets = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(offsets.minutes_for("traffic_log", 1), 5);
        assert_eq!(offsets.minutes_for("traffic_log", 2), -10);
        assert_eq!(offsets.minutes_for("traffic_log", 3), 0);
        assert_eq!(offsets.minutes_for("unknown_table", 1), 0);
        assert!(offsets.for_table("unknown_table").is_none());
    }
}
