use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util;

// ------------------------------------------------------------
// Query unit
// ------------------------------------------------------------
//
// One (product, location) pair to be priced.
//
// Units are generated by the universe builder and never change
// afterwards. `sequence_index` is dense and zero-based within one
// generation of the universe.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QueryUnit {
    /// Stable position inside the universe
    pub sequence_index: usize,

    /// Product identifier (GTIN) as stored in the product list
    pub product_key: String,

    /// Geohash bucket the lookup is centred on
    pub location_key: String,
}

impl QueryUnit {
    pub fn key(&self) -> UnitKey {
        UnitKey {
            product_key: self.product_key.clone(),
            location_key: self.location_key.clone(),
        }
    }
}

/// Identity of a unit that survives universe regeneration.
///
/// Sequence indices shift whenever the product or location list
/// changes; the (product, location) pair does not.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub product_key: String,
    pub location_key: String,
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.product_key, self.location_key)
    }
}

// ------------------------------------------------------------
// Collected record
// ------------------------------------------------------------
//
// A single price observation ("nota") returned by the pricing API.
//
// Natural key: `record_id`. The persistence gateway upserts on it,
// so collecting the same observation twice is harmless.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CollectedRecord {
    /// External identifier of the observation
    pub record_id: String,

    /// Observation time.
    ///
    /// Raw upstream text while collecting, canonical
    /// `YYYY-MM-DD HH:MM:SS` after the post-loop normalization,
    /// `None` when it could not be parsed.
    pub timestamp: Option<String>,

    /// Vendor (point of sale) code
    pub vendor_id: Option<String>,

    /// Geohash bucket the observation was found through
    pub location_key: String,

    /// Product identifier as reported by the API
    pub product_key: String,

    pub description: Option<String>,

    /// Prices are kept as decimal text to avoid float rounding.
    pub list_price: Option<String>,
    pub discount_price: Option<String>,
    pub final_price: Option<String>,

    pub city: Option<String>,
}

// ------------------------------------------------------------
// Unregistered vendor
// ------------------------------------------------------------
//
// A vendor seen in a collected record that is not yet part of the
// known-vendor set. Deduplicated by `vendor_id` within a run and
// geocoded before it is persisted.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnregisteredVendor {
    pub vendor_id: String,
    pub display_name: String,
    pub legal_name: String,
    pub street_address: String,
    pub city: String,
    pub location_key: String,
}

/// Latitude / longitude pair returned by the geocoder.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A vendor ready for persistence.
///
/// `coordinates` is `None` when the lookup found nothing or the
/// vendor was deferred by the per-run lookup cap. Such vendors stay
/// outside the known-vendor set and are picked up again later.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedVendor {
    pub vendor: UnregisteredVendor,
    pub coordinates: Option<Coordinates>,
}

// ------------------------------------------------------------
// Cursor
// ------------------------------------------------------------
//
// Durable progress marker.
//
// - `Start`: no history in the current cycle, begin at batch 0
// - `Completed`: the batch holding `last` finished; rotate forward
// - `Interrupted`: the batch starting at `anchor` stopped early;
//   run it again, resuming after `last_done` (a sequence index)
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Cursor {
    #[default]
    Start,
    Completed {
        last: UnitKey,
    },
    Interrupted {
        anchor: UnitKey,
        last_done: Option<usize>,
    },
}

// ------------------------------------------------------------
// Recovery snapshot
// ------------------------------------------------------------
//
// Results that could not be committed because the primary store was
// unreachable, together with the cursor that becomes current once
// they are committed.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecoverySnapshot {
    pub records: Vec<CollectedRecord>,
    pub vendors: Vec<UnregisteredVendor>,
    pub cursor: Cursor,
}

impl RecoverySnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.vendors.is_empty()
    }
}

// ------------------------------------------------------------
// Pricing API wire format
// ------------------------------------------------------------
//
// Only the fields the feeder uses are declared. Identifier and price
// fields arrive as numbers or strings depending on the record, so
// they are captured as raw JSON values and converted explicitly.
//
#[derive(Debug, Deserialize, Default)]
pub struct LookupResponse {
    #[serde(default, rename = "produtos")]
    pub products: Vec<ApiProduct>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiProduct {
    pub id: Option<Value>,
    pub datahora: Option<String>,
    #[serde(default)]
    pub estabelecimento: Establishment,
    pub gtin: Option<Value>,
    pub desc: Option<String>,
    pub valor: Option<Value>,
    pub valor_desconto: Option<Value>,
    pub valor_tabela: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Establishment {
    pub codigo: Option<Value>,
    pub mun: Option<String>,
    pub tp_logr: Option<String>,
    pub nm_logr: Option<String>,
    pub nr_logr: Option<Value>,
    pub nm_fan: Option<String>,
    pub nm_emp: Option<String>,
}

impl ApiProduct {
    /// Converts one API item into a record.
    ///
    /// Returns `None` when the item carries no usable identifier;
    /// such items cannot be upserted and are dropped by the caller.
    pub fn to_record(&self, unit: &QueryUnit) -> Option<CollectedRecord> {
        let record_id = util::json_key(self.id.as_ref())?;

        Some(CollectedRecord {
            record_id,
            timestamp: self.datahora.clone(),
            vendor_id: self.vendor_id(),
            location_key: unit.location_key.clone(),
            product_key: util::json_key(self.gtin.as_ref())
                .unwrap_or_else(|| unit.product_key.clone()),
            description: self.desc.clone(),
            list_price: util::price_text(self.valor_tabela.as_ref()),
            discount_price: util::price_text(self.valor_desconto.as_ref()),
            final_price: util::price_text(self.valor.as_ref()),
            city: self.estabelecimento.mun.clone(),
        })
    }

    pub fn vendor_id(&self) -> Option<String> {
        util::json_key(self.estabelecimento.codigo.as_ref())
    }

    /// Vendor description for a vendor outside the known set.
    pub fn to_vendor(&self, unit: &QueryUnit) -> Option<UnregisteredVendor> {
        let e = &self.estabelecimento;
        let number = util::json_key(e.nr_logr.as_ref()).unwrap_or_default();

        let street = format!(
            "{} {}, {}",
            e.tp_logr.as_deref().unwrap_or(""),
            e.nm_logr.as_deref().unwrap_or(""),
            number,
        );

        Some(UnregisteredVendor {
            vendor_id: self.vendor_id()?,
            display_name: e.nm_fan.clone().unwrap_or_default(),
            legal_name: e.nm_emp.clone().unwrap_or_default(),
            street_address: street
                .trim_matches(|c: char| c == ',' || c.is_whitespace())
                .to_string(),
            city: e.mun.clone().unwrap_or_default(),
            location_key: unit.location_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit() -> QueryUnit {
        QueryUnit {
            sequence_index: 0,
            product_key: "7894900011517".into(),
            location_key: "6gge7u6cc".into(),
        }
    }

    #[test]
    fn api_item_maps_to_record_and_vendor() {
        let body = json!({
            "produtos": [{
                "id": "abc-1",
                "datahora": "2025-03-01T10:15:00Z",
                "estabelecimento": {
                    "codigo": 4411,
                    "mun": "LONDRINA",
                    "tp_logr": "RUA",
                    "nm_logr": "MARANHAO",
                    "nr_logr": "143",
                    "nm_fan": "FARMACIA CENTRAL",
                    "nm_emp": "CENTRAL LTDA"
                },
                "gtin": 7894900011517u64,
                "desc": "REFRIGERANTE 2L",
                "valor": 9.99,
                "valor_desconto": 0,
                "valor_tabela": "10.49"
            }]
        });

        let parsed: LookupResponse = serde_json::from_value(body).unwrap();
        let item = &parsed.products[0];

        let record = item.to_record(&unit()).unwrap();
        assert_eq!(record.record_id, "abc-1");
        assert_eq!(record.vendor_id.as_deref(), Some("4411"));
        assert_eq!(record.product_key, "7894900011517");
        assert_eq!(record.final_price.as_deref(), Some("9.99"));
        assert_eq!(record.list_price.as_deref(), Some("10.49"));
        assert_eq!(record.city.as_deref(), Some("LONDRINA"));

        let vendor = item.to_vendor(&unit()).unwrap();
        assert_eq!(vendor.vendor_id, "4411");
        assert_eq!(vendor.street_address, "RUA MARANHAO, 143");
        assert_eq!(vendor.location_key, "6gge7u6cc");
    }

    #[test]
    fn item_without_id_is_not_a_record() {
        let item = ApiProduct::default();
        assert!(item.to_record(&unit()).is_none());
        assert!(item.to_vendor(&unit()).is_none());
    }

    #[test]
    fn missing_product_list_parses_as_empty() {
        let parsed: LookupResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.products.is_empty());
    }

    #[test]
    fn cursor_serializes_with_state_tag() {
        let cursor = Cursor::Interrupted {
            anchor: unit().key(),
            last_done: Some(6),
        };
        let text = serde_json::to_string(&cursor).unwrap();
        assert!(text.contains("\"state\":\"interrupted\""));
        let back: Cursor = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cursor);
    }
}
