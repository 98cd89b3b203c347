//! Persistent mapping documents
//!
//! Shapes of the JSON files backing the project and user stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project (point) name to spreadsheet id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectMapping {
    #[serde(default)]
    pub pointname_to_sheetsid: BTreeMap<String, String>,
}

/// Bidirectional chat user id / username mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMapping {
    #[serde(default)]
    pub id_to_username: BTreeMap<String, String>,
    #[serde(default)]
    pub username_to_id: BTreeMap<String, String>,
}
