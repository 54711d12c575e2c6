use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedItem {
    pub name: String,
    pub price: f64,
    pub vendor: String,
    pub category: String,
    /// When the item was classified, not when it was bought.
    pub uploaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub items: Vec<ClassifiedItem>,
    pub tax: f64,
    pub total: f64,
}

impl ParsedReceipt {
    pub fn unknown_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.category == classify::UNKNOWN_CATEGORY)
            .count()
    }
}

/// ISO-8601 with microseconds and an explicit `Z`, e.g. `2024-05-01T12:30:00.123456Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_has_z_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T12:30:00.000000Z");
    }

    #[test]
    fn test_item_serializes_with_uploaded_at_key() {
        let item = ClassifiedItem {
            name: "Milk".into(),
            price: 3.5,
            vendor: "ShopMart".into(),
            category: "food".into(),
            uploaded_at: "2024-05-01T12:30:00.000000Z".into(),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["uploadedAt"], "2024-05-01T12:30:00.000000Z");
        assert!(json.get("uploaded_at").is_none());
    }
}
