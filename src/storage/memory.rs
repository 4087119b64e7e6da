//! In-memory stores for tests, with failure injection.

use std::collections::{HashMap, HashSet, hash_map::Entry};
use std::sync::Mutex;

use chrono::NaiveDateTime;

use crate::{
    error::StoreError,
    schema::{CollectedRecord, Cursor, EnrichedVendor, RecoverySnapshot},
};

use super::{ConflictPolicy, PersistenceGateway, ProgressStore, Table, UpsertReport};

#[derive(Default)]
struct Tables {
    products: Vec<String>,
    locations: Vec<String>,
    products_refreshed: Option<NaiveDateTime>,
    records: HashMap<String, CollectedRecord>,
    vendors: HashMap<String, EnrichedVendor>,
}

#[derive(Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
    failure: Mutex<Option<StoreError>>,
}

impl MemoryGateway {
    pub fn new(products: &[&str], locations: &[&str]) -> Self {
        let gateway = Self::default();
        {
            let mut t = gateway.tables.lock().unwrap();
            t.products = products.iter().map(|s| s.to_string()).collect();
            t.locations = locations.iter().map(|s| s.to_string()).collect();
        }
        gateway
    }

    pub fn products_refreshed_at(self, ts: NaiveDateTime) -> Self {
        self.tables.lock().unwrap().products_refreshed = Some(ts);
        self
    }

    /// Every following upsert fails with `error`.
    pub fn fail_with(&self, error: StoreError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn heal(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn register_vendor(&self, vendor: EnrichedVendor) {
        self.tables
            .lock()
            .unwrap()
            .vendors
            .insert(vendor.vendor.vendor_id.clone(), vendor);
    }

    pub fn record_count(&self) -> usize {
        self.tables.lock().unwrap().records.len()
    }

    pub fn vendor(&self, id: &str) -> Option<EnrichedVendor> {
        self.tables.lock().unwrap().vendors.get(id).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        match &*self.failure.lock().unwrap() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn product_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.lock().unwrap().products.clone())
    }

    async fn location_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.lock().unwrap().locations.clone())
    }

    async fn known_vendor_ids(&self) -> Result<HashSet<String>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.vendors
            .values()
            .filter(|v| v.coordinates.is_some())
            .map(|v| v.vendor.vendor_id.clone())
            .collect())
    }

    async fn latest_update(&self, table: Table) -> Result<Option<NaiveDateTime>, StoreError> {
        Ok(match table {
            Table::Products => self.tables.lock().unwrap().products_refreshed,
            _ => None,
        })
    }

    async fn upsert_records(
        &self,
        records: &[CollectedRecord],
        policy: ConflictPolicy,
        _refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError> {
        self.check()?;

        let mut t = self.tables.lock().unwrap();

        let mut report = UpsertReport {
            submitted: records.len(),
            ..UpsertReport::default()
        };
        for r in records {
            let exists = t.records.contains_key(&r.record_id);
            if !exists || policy == ConflictPolicy::Overwrite {
                t.records.insert(r.record_id.clone(), r.clone());
            }
            if exists {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }
        Ok(report)
    }

    async fn upsert_vendors(
        &self,
        vendors: &[EnrichedVendor],
        _policy: ConflictPolicy,
        _refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError> {
        self.check()?;

        let mut t = self.tables.lock().unwrap();
        let mut report = UpsertReport {
            submitted: vendors.len(),
            ..UpsertReport::default()
        };
        for v in vendors {
            match t.vendors.entry(v.vendor.vendor_id.clone()) {
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if existing.coordinates.is_none() {
                        existing.coordinates = v.coordinates;
                    }
                    report.updated += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(v.clone());
                    report.inserted += 1;
                }
            }
        }
        Ok(report)
    }
}

#[derive(Default)]
pub struct MemoryProgressStore {
    cursor: Mutex<Cursor>,
    snapshot: Mutex<Option<RecoverySnapshot>>,
    failure: Mutex<Option<StoreError>>,
}

impl MemoryProgressStore {
    pub fn cursor(&self) -> Cursor {
        self.cursor.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> Option<RecoverySnapshot> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn fail_with(&self, error: StoreError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn check(&self) -> Result<(), StoreError> {
        match &*self.failure.lock().unwrap() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load_cursor(&self) -> Result<Cursor, StoreError> {
        self.check()?;
        Ok(self.cursor())
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StoreError> {
        self.check()?;
        *self.cursor.lock().unwrap() = cursor.clone();
        Ok(())
    }

    async fn stage_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        self.check()?;
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn drain_snapshot(&self, cursor: &Cursor) -> Result<(), StoreError> {
        self.check()?;
        *self.snapshot.lock().unwrap() = None;
        *self.cursor.lock().unwrap() = cursor.clone();
        Ok(())
    }
}
