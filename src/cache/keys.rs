//! Query key definitions.
//!
//! A `QueryKey` is an ordered tuple of primitive parts, compared structurally.
//! List keys are a single part (`["products"]`); detail keys append the id
//! (`["products", "7"]`), so a list key is a prefix of every detail key of the
//! same entity.

use std::fmt;

use patisserie_records::RecordId;
use serde::{Serialize, Serializer};

use crate::domain::entities::EntityKind;

/// One primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Text(value) => f.write_str(value),
            KeyPart::Int(value) => write!(f, "{value}"),
            KeyPart::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Text(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Key of the full list for an entity kind.
    pub fn list(kind: EntityKind) -> Self {
        Self(vec![KeyPart::Text(collection_name(kind).to_string())])
    }

    /// Key of a single row of an entity kind.
    pub fn detail(kind: EntityKind, id: &RecordId) -> Self {
        Self(vec![
            KeyPart::Text(collection_name(kind).to_string()),
            KeyPart::Text(id.as_str().to_string()),
        ])
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn collection_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Product => "products",
        EntityKind::Category => "categories",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_structurally() {
        let a = QueryKey::detail(EntityKind::Product, &RecordId::new("7"));
        let b = QueryKey::new(["products", "7"]);
        assert_eq!(a, b);
        assert_ne!(a, QueryKey::detail(EntityKind::Category, &RecordId::new("7")));
    }

    #[test]
    fn list_key_prefixes_detail_keys() {
        let list = QueryKey::list(EntityKind::Product);
        let detail = QueryKey::detail(EntityKind::Product, &RecordId::new("7"));
        assert!(detail.starts_with(&list));
        assert!(!list.starts_with(&detail));
        assert!(!detail.starts_with(&QueryKey::list(EntityKind::Category)));
    }

    #[test]
    fn display_joins_parts() {
        let key = QueryKey::new([KeyPart::from("products"), KeyPart::from(7), KeyPart::from(true)]);
        assert_eq!(key.to_string(), "products/7/true");
    }
}
