use serde::{Deserialize, Serialize};

/// Documento de la colección `counters`: una secuencia de ids por colección
#[derive(Debug, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}
