//! Named reads of the admin panel and storefront.

use std::sync::Arc;

use futures::FutureExt;
use patisserie_records::RecordId;
use serde_json::Value;

use crate::application::gateway::{Gateway, GatewayError, RowFilter};
use crate::cache::{Fetcher, QueryKey};
use crate::config::TableSettings;
use crate::domain::entities::EntityKind;

/// Products are listed with the name of their category embedded.
pub const PRODUCT_SELECT: &str = "*,categorias(nombre)";
pub const CATEGORY_SELECT: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamedQuery {
    ProductsList,
    ProductDetail(RecordId),
    CategoriesList,
    CategoryDetail(RecordId),
}

impl NamedQuery {
    pub fn entity(&self) -> EntityKind {
        match self {
            NamedQuery::ProductsList | NamedQuery::ProductDetail(_) => EntityKind::Product,
            NamedQuery::CategoriesList | NamedQuery::CategoryDetail(_) => EntityKind::Category,
        }
    }

    pub fn key(&self) -> QueryKey {
        match self {
            NamedQuery::ProductsList | NamedQuery::CategoriesList => QueryKey::list(self.entity()),
            NamedQuery::ProductDetail(id) | NamedQuery::CategoryDetail(id) => {
                QueryKey::detail(self.entity(), id)
            }
        }
    }

    /// Build the fetcher that loads this query through `gateway`.
    pub fn fetcher(&self, gateway: Arc<dyn Gateway>, tables: &TableSettings) -> Fetcher {
        let table = tables.for_kind(self.entity()).to_string();
        let select = match self.entity() {
            EntityKind::Product => PRODUCT_SELECT,
            EntityKind::Category => CATEGORY_SELECT,
        };
        let query = self.clone();

        Arc::new(move || {
            let gateway = gateway.clone();
            let table = table.clone();
            let query = query.clone();
            async move {
                match &query {
                    NamedQuery::ProductsList | NamedQuery::CategoriesList => {
                        let rows = gateway.query_rows(&table, &RowFilter::select(select)).await?;
                        Ok(Value::Array(rows))
                    }
                    NamedQuery::ProductDetail(id) | NamedQuery::CategoryDetail(id) => {
                        let filter = RowFilter::select(select).and_eq("id", id.as_str());
                        let rows = gateway.query_rows(&table, &filter).await?;
                        rows.into_iter().next().ok_or(GatewayError::NotFound)
                    }
                }
            }
            .boxed()
        })
    }
}
