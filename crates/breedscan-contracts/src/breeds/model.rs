use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreedType {
    Cattle,
    Buffalo,
}

impl BreedType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cattle => "cattle",
            Self::Buffalo => "buffalo",
        }
    }
}

impl fmt::Display for BreedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreedType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cattle" | "cow" => Ok(Self::Cattle),
            "buffalo" => Ok(Self::Buffalo),
            other => Err(format!(
                "unknown breed type '{other}' (expected cattle or buffalo)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimaryUse {
    #[serde(rename = "dairy")]
    Dairy,
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "dual-purpose")]
    DualPurpose,
}

impl PrimaryUse {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dairy => "dairy",
            Self::Draft => "draft",
            Self::DualPurpose => "dual-purpose",
        }
    }
}

impl fmt::Display for PrimaryUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `breeds` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breed {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub breed_type: BreedType,
    #[serde(default)]
    pub origin_state: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "characteristics_from_json")]
    pub characteristics: IndexMap<String, String>,
    #[serde(default)]
    pub primary_use: Option<PrimaryUse>,
    #[serde(default)]
    pub average_milk_yield: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Breed {
    pub fn new(id: impl Into<String>, name: impl Into<String>, breed_type: BreedType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            breed_type,
            origin_state: None,
            description: None,
            characteristics: IndexMap::new(),
            primary_use: None,
            average_milk_yield: None,
            image_url: None,
            created_at: None,
        }
    }

    pub fn with_origin(mut self, origin_state: impl Into<String>) -> Self {
        self.origin_state = Some(origin_state.into());
        self
    }

    pub fn with_primary_use(mut self, primary_use: PrimaryUse) -> Self {
        self.primary_use = Some(primary_use);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_characteristic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.characteristics.insert(key.into(), value.into());
        self
    }
}

// jsonb columns may hold null or non-string scalars.
fn characteristics_from_json<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(text) => text,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Breed, BreedType, PrimaryUse};

    #[test]
    fn breed_row_deserializes_from_store_shape() -> anyhow::Result<()> {
        let row = json!({
            "id": "b1",
            "name": "Gir",
            "type": "cattle",
            "origin_state": "Gujarat",
            "description": "Domed forehead",
            "characteristics": {"body_color": "red", "horns": "curved", "weight_kg": 400, "hump": null},
            "primary_use": "dual-purpose",
            "average_milk_yield": "12 L/day",
            "image_url": null,
            "created_at": "2025-01-01T00:00:00Z"
        });
        let breed: Breed = serde_json::from_value(row)?;
        assert_eq!(breed.breed_type, BreedType::Cattle);
        assert_eq!(breed.primary_use, Some(PrimaryUse::DualPurpose));
        assert_eq!(
            breed.characteristics.keys().collect::<Vec<_>>(),
            vec!["body_color", "horns", "weight_kg"]
        );
        assert_eq!(breed.characteristics["weight_kg"], "400");
        Ok(())
    }

    #[test]
    fn missing_optional_columns_default() -> anyhow::Result<()> {
        let breed: Breed = serde_json::from_value(json!({
            "id": "b2",
            "name": "Murrah",
            "type": "buffalo",
            "characteristics": null
        }))?;
        assert!(breed.characteristics.is_empty());
        assert!(breed.origin_state.is_none());
        assert!(breed.primary_use.is_none());
        Ok(())
    }

    #[test]
    fn breed_type_parses_case_insensitively() {
        assert_eq!("Buffalo".parse::<BreedType>(), Ok(BreedType::Buffalo));
        assert_eq!(" cattle ".parse::<BreedType>(), Ok(BreedType::Cattle));
        assert!("yak".parse::<BreedType>().is_err());
    }
}
