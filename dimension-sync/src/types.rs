use std::fmt;

use serde::Deserialize;

use crate::error::EventError;

/// The six upstream entity kinds that emit change events.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Brand,
    Category,
    Product,
    ProductIntro,
    ProductProperty,
    ProductSpecification,
}

impl DimensionKind {
    /// The coarse dimension this kind rolls up to downstream.
    pub fn dimension_type(&self) -> DimensionType {
        match self {
            DimensionKind::Brand => DimensionType::Brand,
            DimensionKind::Category => DimensionType::Category,
            DimensionKind::Product
            | DimensionKind::ProductIntro
            | DimensionKind::ProductProperty
            | DimensionKind::ProductSpecification => DimensionType::Product,
        }
    }

    /// Product sub-documents are keyed by their owning product, not by
    /// their own row id.
    pub fn keyed_by_product(&self) -> bool {
        matches!(
            self,
            DimensionKind::ProductIntro
                | DimensionKind::ProductProperty
                | DimensionKind::ProductSpecification
        )
    }

    /// Wire name, also used as the catalog service path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Brand => "brand",
            DimensionKind::Category => "category",
            DimensionKind::Product => "product",
            DimensionKind::ProductIntro => "product_intro",
            DimensionKind::ProductProperty => "product_property",
            DimensionKind::ProductSpecification => "product_specification",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// One decoded "dimension data changed" message, immutable once decoded.
#[derive(Clone, Debug, Deserialize)]
pub struct ChangeEvent {
    pub data_type: DimensionKind,
    pub event_type: ChangeKind,
    pub id: i64,
    pub product_id: Option<i64>,
}

impl ChangeEvent {
    /// Decode an inbound payload. This runs before any side effect, so a
    /// failure here drops the event cleanly.
    pub fn from_payload(payload: &[u8]) -> Result<Self, EventError> {
        let event: ChangeEvent = serde_json::from_slice(payload)?;
        if event.data_type.keyed_by_product() && event.product_id.is_none() {
            return Err(EventError::MissingProductId(event.data_type));
        }
        Ok(event)
    }

    /// The id the cache entry and downstream notification are keyed by:
    /// the owning product for product sub-documents (presence enforced at
    /// decode time), the row id otherwise.
    pub fn key_id(&self) -> i64 {
        if self.data_type.keyed_by_product() {
            self.product_id.unwrap_or(self.id)
        } else {
            self.id
        }
    }
}

/// Downstream dimension granularity: the six fine-grained kinds collapse
/// into these three.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DimensionType {
    Brand,
    Category,
    Product,
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DimensionType::Brand => f.write_str("brand"),
            DimensionType::Category => f.write_str("category"),
            DimensionType::Product => f.write_str("product"),
        }
    }
}

/// A coarse "dimension changed" signal. Value identity doubles as the
/// dedup key, and `encode` is the only serialization path, so two events
/// that must collapse downstream always produce byte-identical payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Notification {
    pub dim_type: DimensionType,
    pub id: i64,
}

impl Notification {
    pub fn new(dim_type: DimensionType, id: i64) -> Self {
        Self { dim_type, id }
    }

    /// Canonical wire form, used both as the outbound payload and as the
    /// dedup identity.
    pub fn encode(&self) -> String {
        format!(r#"{{"dim_type": "{}", "id": {}}}"#, self.dim_type, self.id)
    }
}
