//! Row shapes exchanged with the hosted backend.
//!
//! Field names follow the backend's column names through serde renames so the
//! same structs decode query results and encode upsert bodies.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Primary key of a backend row.
///
/// The backend may emit identifiers as JSON numbers or strings; both are kept
/// in their textual form because the core only uses them for equality and for
/// `id=eq.<value>` filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

/// Portion size offered for a product, e.g. "18 cm" serving 10 people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Serving {
    pub size: String,
    pub servings: u32,
}

/// Category name embedded in product list rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryName {
    #[serde(rename = "nombre")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: RecordId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion_corta")]
    pub short_description: String,
    #[serde(rename = "descripcion_larga", default)]
    pub long_description: Option<String>,
    #[serde(rename = "precio")]
    pub price: f64,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<RecordId>,
    #[serde(rename = "imagen_url", default)]
    pub image_urls: Vec<String>,
    #[serde(rename = "ingredientes", default)]
    pub ingredients: Vec<String>,
    #[serde(rename = "porciones", default)]
    pub servings: Vec<Serving>,
    #[serde(rename = "es_destacado", default)]
    pub featured: bool,
    #[serde(rename = "categorias", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: RecordId,
    #[serde(rename = "nombre")]
    pub name: String,
    pub slug: String,
}

/// Column holding a product's image references.
pub const PRODUCT_IMAGES_COLUMN: &str = "imagen_url";
