use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record as returned by the query endpoint: an open field map including
/// the `attributes` metadata key the CSV report pipeline strips.
pub type SObject = Map<String, Value>;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueryResult {
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    pub done: bool,
    pub records: Vec<SObject>,
}

/// Outcome of a create/update/delete call.
///
/// Update and delete respond with no body on success; the client
/// synthesizes a successful result carrying the targeted id so all three
/// write operations share one shape.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SaveResult {
    pub id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FieldDescribe {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub custom: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectDescribe {
    pub name: String,
    pub label: String,
    pub fields: Vec<FieldDescribe>,
}
