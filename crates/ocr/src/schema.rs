use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An uploaded receipt image, exactly as the caller sent it.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Opaque token identifying one in-flight extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobToken(pub String);

impl std::fmt::Display for JobToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtraction {
    #[serde(default)]
    pub establishment: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub line_items: Vec<ExtractedLine>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub summary_items: Vec<ExtractedLine>,
}

/// A line or summary row. Only the cleaned description and the total are read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLine {
    #[serde(default)]
    pub desc_clean: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub line_total: Option<f64>,
}

/// Outcome of a single result poll.
#[derive(Debug, Clone)]
pub enum PollStatus {
    Ready(RawExtraction),
    Processing,
}

/// Status codes the provider embeds in its result body.
pub const CODE_READY: i64 = 202;
pub const CODE_PROCESSING: i64 = 301;

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ExtractedLine>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ExtractedLine>>::deserialize(deserializer)?.unwrap_or_default())
}

// Amounts show up as numbers or as numeric strings depending on the receipt.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
