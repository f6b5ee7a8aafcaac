//! Draft records edited in the admin forms and their validation rules.
//!
//! Validation is a pure function from a draft to a map of field errors. Field
//! paths for list rows are indexed, e.g. `ingredients[1]` or `servings[0].size`.

use std::collections::BTreeMap;

use patisserie_records::{CategoryRecord, ProductRecord, Serving};
use serde_json::{Map, json};

use super::entities::{Attachment, EntityPayload};
use super::slug::derive_slug;

/// Field path → user-facing message. Empty means the draft is valid.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct ServingDraft {
    pub size: String,
    pub servings: u32,
}

impl Default for ServingDraft {
    fn default() -> Self {
        Self {
            size: String::new(),
            servings: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub short_description: String,
    pub long_description: String,
    pub price: f64,
    pub category_id: String,
    pub images: Vec<Attachment>,
    pub ingredients: Vec<String>,
    pub servings: Vec<ServingDraft>,
    pub featured: bool,
}

impl Default for ProductDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            short_description: String::new(),
            long_description: String::new(),
            price: 0.0,
            category_id: String::new(),
            images: Vec::new(),
            ingredients: vec![String::new()],
            servings: vec![ServingDraft::default()],
            featured: false,
        }
    }
}

impl ProductDraft {
    /// Seed a draft from an existing row (edit mode) or defaults (create mode).
    pub fn from_record(record: Option<&ProductRecord>) -> Self {
        let Some(record) = record else {
            return Self::default();
        };

        let ingredients = if record.ingredients.is_empty() {
            vec![String::new()]
        } else {
            record.ingredients.clone()
        };
        let servings = if record.servings.is_empty() {
            vec![ServingDraft::default()]
        } else {
            record
                .servings
                .iter()
                .map(|serving| ServingDraft {
                    size: serving.size.clone(),
                    servings: serving.servings,
                })
                .collect()
        };

        Self {
            name: record.name.clone(),
            short_description: record.short_description.clone(),
            long_description: record.long_description.clone().unwrap_or_default(),
            price: record.price,
            category_id: record
                .category_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            images: record
                .image_urls
                .iter()
                .cloned()
                .map(Attachment::Persisted)
                .collect(),
            ingredients,
            servings,
            featured: record.featured,
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if self.name.trim().is_empty() {
            errors.insert("name".into(), "Name is required.".into());
        }
        if self.short_description.trim().is_empty() {
            errors.insert(
                "short_description".into(),
                "Short description is required.".into(),
            );
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            errors.insert("price".into(), "Price must be a positive number.".into());
        }
        if self.category_id.trim().is_empty() {
            errors.insert("category_id".into(), "Category is required.".into());
        }
        if self.images.is_empty() {
            errors.insert("images".into(), "Upload at least one image.".into());
        }
        for (index, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.trim().is_empty() {
                errors.insert(
                    format!("ingredients[{index}]"),
                    "Ingredient cannot be empty.".into(),
                );
            }
        }
        for (index, serving) in self.servings.iter().enumerate() {
            if serving.size.trim().is_empty() {
                errors.insert(
                    format!("servings[{index}].size"),
                    "Serving size is required.".into(),
                );
            }
            if serving.servings == 0 {
                errors.insert(
                    format!("servings[{index}].servings"),
                    "Number of servings must be positive.".into(),
                );
            }
        }

        errors
    }

    pub fn into_payload(self) -> EntityPayload {
        let servings: Vec<Serving> = self
            .servings
            .into_iter()
            .map(|serving| Serving {
                size: serving.size.trim().to_string(),
                servings: serving.servings,
            })
            .collect();
        let ingredients: Vec<String> = self
            .ingredients
            .into_iter()
            .map(|ingredient| ingredient.trim().to_string())
            .collect();

        let mut fields = Map::new();
        fields.insert("nombre".into(), json!(self.name.trim()));
        fields.insert(
            "descripcion_corta".into(),
            json!(self.short_description.trim()),
        );
        fields.insert(
            "descripcion_larga".into(),
            json!(self.long_description.trim()),
        );
        fields.insert("precio".into(), json!(self.price));
        fields.insert("categoria_id".into(), json!(self.category_id.trim()));
        fields.insert("ingredientes".into(), json!(ingredients));
        fields.insert("porciones".into(), json!(servings));
        fields.insert("es_destacado".into(), json!(self.featured));

        EntityPayload::new(fields).with_attachments(self.images)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub slug: String,
}

impl CategoryDraft {
    pub fn from_record(record: Option<&CategoryRecord>) -> Self {
        record
            .map(|record| Self {
                name: record.name.clone(),
                slug: record.slug.clone(),
            })
            .unwrap_or_default()
    }

    /// Fill a blank slug from the name. Leaves the slug blank if the name cannot produce one.
    pub fn normalize(&mut self) {
        if self.slug.trim().is_empty()
            && let Ok(slug) = derive_slug(&self.name)
        {
            self.slug = slug;
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.insert("name".into(), "Name is required.".into());
        }
        if self.slug.trim().is_empty() {
            errors.insert("slug".into(), "Slug is required.".into());
        }
        errors
    }

    pub fn into_payload(self) -> EntityPayload {
        let mut fields = Map::new();
        fields.insert("nombre".into(), json!(self.name.trim()));
        fields.insert("slug".into(), json!(self.slug.trim()));
        EntityPayload::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use patisserie_records::RecordId;

    use super::*;

    fn valid_product() -> ProductDraft {
        ProductDraft {
            name: "Pie de limón".into(),
            short_description: "Merengue italiano".into(),
            price: 14990.0,
            category_id: "3".into(),
            images: vec![Attachment::Persisted("https://cdn/pie.webp".into())],
            ingredients: vec!["limón".into()],
            servings: vec![ServingDraft {
                size: "22 cm".into(),
                servings: 12,
            }],
            ..ProductDraft::default()
        }
    }

    #[test]
    fn defaults_validate_with_every_required_field_flagged() {
        let errors = ProductDraft::default().validate();

        let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
        assert_eq!(
            fields,
            vec![
                "category_id",
                "images",
                "ingredients[0]",
                "name",
                "price",
                "servings[0].servings",
                "servings[0].size",
                "short_description",
            ]
        );
    }

    #[test]
    fn valid_product_has_no_errors() {
        assert!(valid_product().validate().is_empty());
    }

    #[test]
    fn product_payload_uses_backend_columns() {
        let payload = valid_product().into_payload();

        assert_eq!(payload.fields["nombre"], json!("Pie de limón"));
        assert_eq!(payload.fields["descripcion_larga"], json!(""));
        assert_eq!(
            payload.fields["porciones"],
            json!([{"size": "22 cm", "servings": 12}])
        );
        assert_eq!(payload.fields["es_destacado"], json!(false));
        assert!(!payload.fields.contains_key("imagen_url"));
        assert_eq!(payload.attachments.len(), 1);
    }

    #[test]
    fn product_draft_from_record_keeps_existing_images() {
        let record = ProductRecord {
            id: RecordId::new("9"),
            name: "Kuchen".into(),
            short_description: "De nuez".into(),
            long_description: None,
            price: 9990.0,
            category_id: Some(RecordId::new("2")),
            image_urls: vec!["https://cdn/k.webp".into()],
            ingredients: Vec::new(),
            servings: Vec::new(),
            featured: true,
            category: None,
        };

        let draft = ProductDraft::from_record(Some(&record));
        assert_eq!(draft.category_id, "2");
        assert_eq!(
            draft.images,
            vec![Attachment::Persisted("https://cdn/k.webp".into())]
        );
        assert_eq!(draft.ingredients, vec![String::new()]);
        assert!(draft.featured);
    }

    #[test]
    fn category_slug_is_derived_when_blank() {
        let mut draft = CategoryDraft {
            name: "Galletas Artesanales".into(),
            slug: "  ".into(),
        };
        draft.normalize();
        assert_eq!(draft.slug, "galletas-artesanales");
        assert!(draft.validate().is_empty());
    }

    #[test]
    fn category_without_name_reports_both_fields() {
        let mut draft = CategoryDraft::default();
        draft.normalize();
        let errors = draft.validate();
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("slug"));
    }
}
