use serde::{Deserialize, Deserializer, Serialize};

/// Stored image snapshots are a debugging breadcrumb, not an archive.
pub const IMAGE_DATA_MAX_CHARS: usize = 100;

/// Row of the `recognition_history` table.
///
/// `id` and `recognition_date` are assigned by the store and are only present
/// on rows read back from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub breed_id: Option<String>,
    pub confidence_score: Option<f64>,
    pub image_data: Option<String>,
    #[serde(default, deserialize_with = "metadata_or_default")]
    pub metadata: HistoryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMetadata {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub characteristics: Vec<String>,
    #[serde(default)]
    pub alternatives: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_sha256: Option<String>,
}

impl HistoryRecord {
    /// New insert row; the image payload is cut to its first 100 characters.
    pub fn new(
        breed_id: impl Into<String>,
        confidence: f64,
        image_data: &str,
        metadata: HistoryMetadata,
    ) -> Self {
        Self {
            id: None,
            breed_id: Some(breed_id.into()),
            confidence_score: Some(confidence),
            image_data: Some(truncate_image_data(image_data)),
            metadata,
            recognition_date: None,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

fn metadata_or_default<'de, D>(deserializer: D) -> Result<HistoryMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HistoryMetadata>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn truncate_image_data(image_data: &str) -> String {
    image_data.chars().take(IMAGE_DATA_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{HistoryMetadata, HistoryRecord, IMAGE_DATA_MAX_CHARS};

    #[test]
    fn insert_row_truncates_image_and_omits_store_columns() -> anyhow::Result<()> {
        let image = format!("data:image/jpeg;base64,{}", "A".repeat(500));
        let record = HistoryRecord::new(
            "breed-1",
            87.0,
            &image,
            HistoryMetadata {
                reasoning: "domed forehead".to_string(),
                characteristics: vec!["red coat".to_string()],
                alternatives: 3,
                ..HistoryMetadata::default()
            },
        );
        assert_eq!(
            record.image_data.as_deref().map(str::len),
            Some(IMAGE_DATA_MAX_CHARS)
        );

        let row = serde_json::to_value(&record)?;
        let object = row.as_object().cloned().unwrap_or_default();
        assert!(!object.contains_key("id"));
        assert!(!object.contains_key("recognition_date"));
        assert!(!object.contains_key("user_id"));
        assert_eq!(row["breed_id"], Value::String("breed-1".to_string()));
        assert_eq!(row["metadata"]["alternatives"], Value::from(3));
        assert!(row["metadata"].get("model").is_none());
        Ok(())
    }

    #[test]
    fn stored_rows_deserialize_with_sparse_metadata() -> anyhow::Result<()> {
        let record: HistoryRecord = serde_json::from_str(
            r#"{"id":"h1","breed_id":null,"confidence_score":42,"image_data":null,
                "metadata":{"reasoning":"hump"},"recognition_date":"2025-03-01T10:00:00Z","user_id":null}"#,
        )?;
        assert_eq!(record.id.as_deref(), Some("h1"));
        assert_eq!(record.confidence_score, Some(42.0));
        assert_eq!(record.metadata.alternatives, 0);

        let bare: HistoryRecord = serde_json::from_str(
            r#"{"breed_id":"b2","confidence_score":null,"image_data":null,"metadata":null}"#,
        )?;
        assert_eq!(bare.metadata, HistoryMetadata::default());
        Ok(())
    }
}
