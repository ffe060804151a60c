use std::collections::HashMap;

use serde_json::{Map, Value};

/// Standard contact columns forwarded from a CSV row to the CRM.
///
/// Anything outside this list is dropped unless it carries the custom-field
/// suffix. `AccountName` is handled separately: it drives parent lookup and
/// never reaches the created record.
pub const CONTACT_FIELDS: [&str; 13] = [
    "FirstName",
    "LastName",
    "Email",
    "Phone",
    "Title",
    "Department",
    "MailingStreet",
    "MailingCity",
    "MailingState",
    "MailingPostalCode",
    "MailingCountry",
    "Description",
    "LeadSource",
];

pub const CUSTOM_FIELD_SUFFIX: &str = "__c";
pub const ACCOUNT_NAME_KEY: &str = "AccountName";

/// Substituted when a row has no usable `LastName` — the one required field.
pub const LAST_NAME_PLACEHOLDER: &str = "Unknown";

/// A CSV row mapped to a candidate CRM record, before account resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct MappedContact {
    pub fields: Map<String, Value>,
    pub account_name: Option<String>,
}

/// Map one header→value row into a candidate contact record.
///
/// Keeps allow-listed fields and `__c` columns, discards the rest, and
/// guarantees a non-empty `LastName` by substituting the placeholder.
pub fn map_contact_row(row: &HashMap<String, String>) -> MappedContact {
    let mut fields = Map::new();
    let mut account_name = None;

    for (key, raw_value) in row {
        let value = raw_value.trim();
        if value.is_empty() {
            continue;
        }

        if key == ACCOUNT_NAME_KEY {
            account_name = Some(value.to_string());
        } else if CONTACT_FIELDS.contains(&key.as_str()) || key.ends_with(CUSTOM_FIELD_SUFFIX) {
            fields.insert(key.clone(), Value::String(value.to_string()));
        }
    }

    if !fields.get("LastName").and_then(Value::as_str).is_some_and(|name| !name.is_empty()) {
        fields.insert("LastName".to_string(), Value::String(LAST_NAME_PLACEHOLDER.to_string()));
    }

    MappedContact { fields, account_name }
}

/// Human-readable name for the import result listing: "First Last", trimmed.
pub fn display_name(fields: &Map<String, Value>) -> String {
    let first = fields.get("FirstName").and_then(Value::as_str).unwrap_or("");
    let last = fields.get("LastName").and_then(Value::as_str).unwrap_or("");
    format!("{first} {last}").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{display_name, map_contact_row, LAST_NAME_PLACEHOLDER};

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn allowlisted_and_custom_fields_are_kept_others_dropped() {
        let mapped = map_contact_row(&row(&[
            ("FirstName", "Ada"),
            ("LastName", "Lovelace"),
            ("FavoriteColor", "green"),
            ("Region__c", "EMEA"),
        ]));

        assert_eq!(mapped.fields.get("FirstName").unwrap(), "Ada");
        assert_eq!(mapped.fields.get("Region__c").unwrap(), "EMEA");
        assert!(mapped.fields.get("FavoriteColor").is_none());
    }

    #[test]
    fn missing_last_name_gets_the_placeholder() {
        let mapped = map_contact_row(&row(&[("FirstName", "Ada"), ("Email", "ada@example.com")]));
        assert_eq!(mapped.fields.get("LastName").unwrap(), LAST_NAME_PLACEHOLDER);
    }

    #[test]
    fn blank_last_name_gets_the_placeholder() {
        let mapped = map_contact_row(&row(&[("FirstName", "Ada"), ("LastName", "   ")]));
        assert_eq!(mapped.fields.get("LastName").unwrap(), LAST_NAME_PLACEHOLDER);
    }

    #[test]
    fn account_name_is_extracted_and_not_forwarded() {
        let mapped =
            map_contact_row(&row(&[("LastName", "Lovelace"), ("AccountName", "Analytical Ltd")]));

        assert_eq!(mapped.account_name.as_deref(), Some("Analytical Ltd"));
        assert!(mapped.fields.get("AccountName").is_none());
    }

    #[test]
    fn empty_cells_are_skipped() {
        let mapped = map_contact_row(&row(&[("LastName", "Lovelace"), ("Phone", "")]));
        assert!(mapped.fields.get("Phone").is_none());
    }

    #[test]
    fn display_name_joins_and_trims() {
        let mapped = map_contact_row(&row(&[("LastName", "Lovelace")]));
        assert_eq!(display_name(&mapped.fields), "Lovelace");

        let full = map_contact_row(&row(&[("FirstName", "Ada"), ("LastName", "Lovelace")]));
        assert_eq!(display_name(&full.fields), "Ada Lovelace");
    }
}
