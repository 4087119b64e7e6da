//! Scripted collaborators for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::ApiError;
use crate::schema::{ApiProduct, Coordinates, Establishment, QueryUnit};

use super::adapter::{Geocoder, Notifier, PriceLookup, PricingApi};

type Answer = Result<PriceLookup, ApiError>;

/// Pricing API answering from a per-unit script.
///
/// Answers for a unit are consumed in order; the last one repeats.
/// Units without a script get `fallback` (204 by default).
pub struct ScriptedPricing {
    script: Mutex<HashMap<usize, VecDeque<Answer>>>,
    fallback: Answer,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedPricing {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            fallback: Ok(PriceLookup::NoContent),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fallback(mut self, answer: Answer) -> Self {
        self.fallback = answer;
        self
    }

    pub fn on(self, sequence_index: usize, answers: Vec<Answer>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(sequence_index, answers.into());
        self
    }

    /// Sequence indices in the order they were requested.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PricingApi for ScriptedPricing {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn lookup(&self, unit: &QueryUnit) -> Result<PriceLookup, ApiError> {
        self.calls.lock().unwrap().push(unit.sequence_index);

        let mut script = self.script.lock().unwrap();
        match script.get_mut(&unit.sequence_index) {
            Some(answers) if answers.len() > 1 => answers.pop_front().unwrap(),
            Some(answers) if !answers.is_empty() => answers[0].clone(),
            _ => self.fallback.clone(),
        }
    }
}

/// One API item with the given record id and vendor code.
pub fn product(record_id: &str, vendor_id: &str) -> ApiProduct {
    ApiProduct {
        id: Some(record_id.into()),
        datahora: Some("2025-03-01T10:15:00.000Z".into()),
        estabelecimento: Establishment {
            codigo: Some(vendor_id.into()),
            mun: Some("CURITIBA".into()),
            tp_logr: Some("RUA".into()),
            nm_logr: Some("XV DE NOVEMBRO".into()),
            nr_logr: Some(100.into()),
            nm_fan: Some(format!("LOJA {vendor_id}")),
            nm_emp: Some(format!("LOJA {vendor_id} LTDA")),
        },
        gtin: Some("7891000100103".into()),
        desc: Some("ACHOCOLATADO 400G".into()),
        valor: Some(serde_json::json!(8.49)),
        valor_desconto: Some(serde_json::json!(0)),
        valor_tabela: Some(serde_json::json!(8.99)),
    }
}

/// Geocoder that resolves every address to the same point.
pub struct FixedGeocoder {
    answer: Option<Coordinates>,
    queries: Mutex<Vec<String>>,
}

impl FixedGeocoder {
    pub fn hit() -> Self {
        Self {
            answer: Some(Coordinates {
                latitude: -25.43,
                longitude: -49.27,
            }),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn miss() -> Self {
        Self {
            answer: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Geocoder for FixedGeocoder {
    async fn locate(&self, address: &str) -> Option<Coordinates> {
        self.queries.lock().unwrap().push(address.to_string());
        self.answer
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
