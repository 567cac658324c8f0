//! Index metadata as exchanged between endpoints.
//!
//! The blob form is a JSON object keyed by the index name, e.g.
//! `{"tweets": {"aliases": {}, "mappings": {...}, "settings": {"index": {...}}}}`.
//! The definition is kept as an ordered JSON object; the few keys the pipeline
//! rewrites are replaced in place so every other byte of the block survives.

use crate::error::EndpointError;
use crate::models::{CollectionSet, SettingsOverrides};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexDefinition(Map<String, Value>);

impl IndexDefinition {
    fn from_value(value: Value) -> Result<Self, EndpointError> {
        let Value::Object(map) = value else {
            return Err(EndpointError::MalformedMetadata(
                "index definition is not an object".to_string(),
            ));
        };

        for key in ["aliases", "mappings", "settings"] {
            if map.get(key).is_some_and(|section| !section.is_object()) {
                return Err(EndpointError::MalformedMetadata(format!(
                    "`{key}` is not an object"
                )));
            }
        }
        if map
            .get("settings")
            .and_then(|settings| settings.get("index"))
            .is_some_and(|index| !index.is_object())
        {
            return Err(EndpointError::MalformedMetadata(
                "`settings.index` is not an object".to_string(),
            ));
        }

        Ok(Self(map))
    }

    pub fn aliases(&self) -> Option<&Map<String, Value>> {
        self.0.get("aliases").and_then(Value::as_object)
    }

    pub fn mappings(&self) -> Option<&Map<String, Value>> {
        self.0.get("mappings").and_then(Value::as_object)
    }

    pub fn settings(&self) -> Option<&Value> {
        self.0.get("settings")
    }

    /// `settings.index`, where shard and replica counts live.
    pub fn index_settings(&self) -> Option<&Map<String, Value>> {
        self.settings()
            .and_then(|settings| settings.get("index"))
            .and_then(Value::as_object)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn clear_aliases(&mut self) {
        self.0.insert("aliases".to_string(), Value::Object(Map::new()));
    }

    /// Sets `settings.index.<key>`, keeping the key's position when it exists.
    pub fn set_index_setting(&mut self, key: &str, value: Value) {
        let settings = self
            .0
            .entry("settings")
            .or_insert_with(|| Value::Object(Map::new()));
        if !settings.is_object() {
            *settings = Value::Object(Map::new());
        }
        let Value::Object(settings) = settings else {
            return;
        };

        let index = settings
            .entry("index")
            .or_insert_with(|| Value::Object(Map::new()));
        if !index.is_object() {
            *index = Value::Object(Map::new());
        }
        if let Value::Object(index) = index {
            index.insert(key.to_string(), value);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub name: String,
    pub definition: IndexDefinition,
}

impl IndexMetadata {
    pub fn from_blob(blob: &[u8]) -> Result<Self, EndpointError> {
        let value: Value = serde_json::from_slice(blob)?;
        let Value::Object(map) = value else {
            return Err(EndpointError::MalformedMetadata(
                "expected a JSON object keyed by index name".to_string(),
            ));
        };

        if map.len() != 1 {
            let names = map.keys().cloned().collect::<Vec<_>>();
            return Err(EndpointError::MalformedMetadata(format!(
                "expected exactly one index, found {} ({})",
                map.len(),
                names.join(", ")
            )));
        }

        let Some((name, definition)) = map.into_iter().next() else {
            return Err(EndpointError::MalformedMetadata("no index present".to_string()));
        };
        let definition = IndexDefinition::from_value(definition)?;

        Ok(Self { name, definition })
    }

    /// Single-line JSON blob, keyed by index name.
    pub fn to_blob(&self) -> Result<String, EndpointError> {
        let mut map = Map::new();
        map.insert(self.name.clone(), serde_json::to_value(&self.definition)?);
        Ok(serde_json::to_string(&Value::Object(map))?)
    }

    pub fn collections(&self) -> CollectionSet {
        let mappings = self.definition.mappings().into_iter();
        CollectionSet::new(mappings.flat_map(|mappings| mappings.keys().cloned()))
    }

    pub fn clear_aliases(&mut self) {
        self.definition.clear_aliases();
    }

    /// The definition to create on a destination: aliases dropped so the new
    /// index never steals names from the old one, and shard/replica counts
    /// replaced where an override is set.
    pub fn prepared_for_target(&self, overrides: &SettingsOverrides) -> IndexDefinition {
        let mut definition = self.definition.clone();
        definition.clear_aliases();

        if let Some(replicas) = overrides.replicas {
            definition.set_index_setting("number_of_replicas", Value::String(replicas.to_string()));
        }
        if let Some(shards) = overrides.shards {
            definition.set_index_setting("number_of_shards", Value::String(shards.to_string()));
        }

        definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SETTINGS: &str = r#"{"index":{"creation_date":"1425","number_of_shards":"5","number_of_replicas":"1","refresh_interval":"1s","analysis":{"analyzer":{"folded":{"type":"custom"}}},"uuid":"abc"}}"#;

    fn sample_blob() -> String {
        format!(
            r#"{{"tweets":{{"aliases":{{"current":{{}}}},"mappings":{{"tweet":{{"properties":{{"text":{{"type":"string"}}}}}},"user":{{"properties":{{"name":{{"type":"string"}}}}}}}},"settings":{SETTINGS},"warmers":{{}}}}}}"#
        )
    }

    fn settings_text(definition: &IndexDefinition) -> Result<String, serde_json::Error> {
        serde_json::to_string(&definition.settings())
    }

    #[test]
    fn single_index_blob_is_parsed() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(sample_blob().as_bytes())?;
        assert_eq!(metadata.name, "tweets");
        assert_eq!(
            metadata.collections().iter().collect::<Vec<_>>(),
            vec!["tweet", "user"]
        );
        assert!(metadata.definition.get("warmers").is_some());
        Ok(())
    }

    #[test]
    fn multi_index_blob_is_rejected() {
        let blob = json!({"a": {}, "b": {}}).to_string();
        let result = IndexMetadata::from_blob(blob.as_bytes());
        assert!(matches!(result, Err(EndpointError::MalformedMetadata(_))));
    }

    #[test]
    fn empty_blob_is_rejected() {
        let result = IndexMetadata::from_blob(b"{}");
        assert!(matches!(result, Err(EndpointError::MalformedMetadata(_))));

        let result = IndexMetadata::from_blob(b"[1,2]");
        assert!(matches!(result, Err(EndpointError::MalformedMetadata(_))));
    }

    #[test]
    fn non_object_sections_are_rejected() {
        let result = IndexMetadata::from_blob(br#"{"t":{"mappings":[]}}"#);
        assert!(matches!(result, Err(EndpointError::MalformedMetadata(_))));

        let result = IndexMetadata::from_blob(br#"{"t":{"settings":{"index":"5"}}}"#);
        assert!(matches!(result, Err(EndpointError::MalformedMetadata(_))));
    }

    #[test]
    fn blob_round_trip_is_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(sample_blob().as_bytes())?;
        assert_eq!(metadata.to_blob()?, sample_blob());
        Ok(())
    }

    #[test]
    fn target_definition_keeps_settings_text_without_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(sample_blob().as_bytes())?;

        let untouched = metadata.prepared_for_target(&SettingsOverrides::default());
        assert_eq!(untouched.aliases().map(Map::len), Some(0));
        assert_eq!(settings_text(&untouched)?, SETTINGS);
        Ok(())
    }

    #[test]
    fn overrides_replace_counts_in_place() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(sample_blob().as_bytes())?;

        let overridden = metadata.prepared_for_target(&SettingsOverrides {
            replicas: Some(0),
            shards: Some(3),
        });
        assert_eq!(
            settings_text(&overridden)?,
            SETTINGS
                .replace(r#""number_of_shards":"5""#, r#""number_of_shards":"3""#)
                .replace(r#""number_of_replicas":"1""#, r#""number_of_replicas":"0""#)
        );
        Ok(())
    }

    #[test]
    fn shard_override_applies_without_replica_override() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(sample_blob().as_bytes())?;
        let overridden = metadata.prepared_for_target(&SettingsOverrides {
            replicas: None,
            shards: Some(2),
        });
        let index = overridden.index_settings().ok_or("no index settings")?;
        assert_eq!(index.get("number_of_replicas"), Some(&json!("1")));
        assert_eq!(index.get("number_of_shards"), Some(&json!("2")));
        Ok(())
    }

    #[test]
    fn overrides_create_missing_settings() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = IndexMetadata::from_blob(br#"{"t":{"mappings":{"a":{}}}}"#)?;
        let overridden = metadata.prepared_for_target(&SettingsOverrides {
            replicas: Some(1),
            shards: None,
        });
        assert_eq!(
            serde_json::to_string(&overridden)?,
            r#"{"mappings":{"a":{}},"aliases":{},"settings":{"index":{"number_of_replicas":"1"}}}"#
        );
        Ok(())
    }
}
