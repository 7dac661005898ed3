//! Catalog client: one GET against the metastore, decoded into descriptors.

pub mod descriptor;

use serde::Deserialize;
use serde_json::Value;

use crate::error::IngestError;
use crate::transport::Transport;

pub use descriptor::{DatasetDescriptor, Distribution, Theme};

pub const DEFAULT_CATALOG_URL: &str =
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";

/// The metastore returns a bare array; the `{"items": [...]}` envelope is
/// accepted as well, and an object without `items` is an empty catalog.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogBody {
    Items(Vec<Value>),
    Envelope {
        #[serde(default)]
        items: Vec<Value>,
    },
}

/// Retrieve the full catalog. Any transport or decode failure is fatal for the run.
pub fn fetch_catalog<T>(transport: &T, url: &str) -> Result<Vec<DatasetDescriptor>, IngestError>
where
    T: Transport + ?Sized,
{
    let body = transport
        .get(url)
        .map_err(|err| IngestError::catalog(url, err))?;
    let descriptors = parse_catalog(&body).map_err(|err| IngestError::catalog(url, err))?;
    tracing::info!(url, datasets = descriptors.len(), "catalog retrieved");
    Ok(descriptors)
}

/// Decode a catalog body. Items that do not fit the descriptor schema are
/// dropped with a warning rather than failing the whole catalog.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<DatasetDescriptor>, serde_json::Error> {
    let items = match serde_json::from_slice::<CatalogBody>(body)? {
        CatalogBody::Items(items) | CatalogBody::Envelope { items } => items,
    };

    let mut descriptors = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let identifier = item
            .get("identifier")
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<DatasetDescriptor>(item) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(err) => tracing::warn!(
                index,
                identifier = identifier.as_deref(),
                error = %err,
                "skipping malformed catalog item"
            ),
        }
    }
    Ok(descriptors)
}
