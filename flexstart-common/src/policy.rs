use serde::{Deserialize, Serialize};

/// Bare-metal inclusion mode for compatibility queries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BareMetalMode {
    Included,
    Excluded,
    Required,
}

impl Default for BareMetalMode {
    fn default() -> Self {
        BareMetalMode::Included
    }
}

fn default_multiplier() -> u32 {
    2
}

fn default_cpu_manufacturers() -> Vec<String> {
    vec![
        "amazon-web-services".to_string(),
        "amd".to_string(),
        "intel".to_string(),
        "apple".to_string(),
    ]
}

/// Tunable constraints governing which alternative shapes are acceptable.
///
/// Sourced per-instance (tag referencing a named policy document), falling
/// back to a process-wide default document, falling back to the bundled
/// static policy. Immutable per recovery attempt; passed into every call,
/// never a process-wide singleton.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryPolicy {
    /// Lower-bound relaxation for memory, in percent. 0 means the candidate
    /// must have at least the original memory.
    pub memory_buffer_percentage: u32,
    pub max_cpu_multiplier: u32,
    pub max_memory_multiplier: u32,
    pub bare_metal: BareMetalMode,
    pub cpu_manufacturers: Vec<String>,
    /// Shape ids (or `*` wildcard patterns) never to substitute in.
    pub excluded_instance_types: Vec<String>,
    /// Lower-bound relaxation for local storage, in percent. 100 or more
    /// disables the local-storage requirement entirely.
    pub local_storage_buffer_percentage: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            memory_buffer_percentage: 0,
            max_cpu_multiplier: default_multiplier(),
            max_memory_multiplier: default_multiplier(),
            bare_metal: BareMetalMode::default(),
            cpu_manufacturers: default_cpu_manufacturers(),
            excluded_instance_types: Vec::new(),
            local_storage_buffer_percentage: 0,
        }
    }
}

impl RecoveryPolicy {
    /// Parse a policy document (JSON). Unknown fields are ignored, missing
    /// fields take defaults, so older documents keep working.
    pub fn parse(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let p = RecoveryPolicy::parse("{}").unwrap();
        assert_eq!(p, RecoveryPolicy::default());
        assert_eq!(p.memory_buffer_percentage, 0);
        assert_eq!(p.max_cpu_multiplier, 2);
        assert_eq!(p.max_memory_multiplier, 2);
        assert_eq!(p.bare_metal, BareMetalMode::Included);
    }

    #[test]
    fn partial_document_overrides_defaults() {
        let p = RecoveryPolicy::parse(
            r#"{
                "memoryBufferPercentage": 10,
                "bareMetal": "excluded",
                "excludedInstanceTypes": ["t2.*", "m5.metal"]
            }"#,
        )
        .unwrap();
        assert_eq!(p.memory_buffer_percentage, 10);
        assert_eq!(p.bare_metal, BareMetalMode::Excluded);
        assert_eq!(p.excluded_instance_types, vec!["t2.*", "m5.metal"]);
        // Untouched fields keep defaults.
        assert_eq!(p.max_cpu_multiplier, 2);
        assert_eq!(p.cpu_manufacturers.len(), 4);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(RecoveryPolicy::parse("not json").is_err());
        assert!(RecoveryPolicy::parse(r#"{"bareMetal": "sometimes"}"#).is_err());
    }
}
