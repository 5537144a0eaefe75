/*!
Helpers to load and check the MQTT/HTTP contracts

- Load contracts from the JSON files under `contracts/`
- Check a payload against a contract schema (required fields, field types,
  enumerated values)
*/

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    pub version: String,
    pub topic: String,
    pub contract_type: String,
    pub schema: Value,
    pub description: Option<String>,
}

impl Contract {
    pub fn required_fields(&self) -> Vec<String> {
        self.schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|required| {
                required
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks `payload` against the schema, listing every violation
    pub fn validate(&self, payload: &Value) -> Result<()> {
        let object = match payload.as_object() {
            Some(object) => object,
            None => anyhow::bail!("{}: payload is not an object", self.name),
        };

        let mut violations = Vec::new();

        for field in self.required_fields() {
            if !object.contains_key(&field) {
                violations.push(format!("missing required field '{}'", field));
            }
        }

        if let Some(props) = self.schema.get("properties").and_then(|p| p.as_object()) {
            for (field, value) in object {
                let field_schema = match props.get(field) {
                    Some(schema) => schema,
                    None => {
                        if self.schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                            violations.push(format!("unexpected field '{}'", field));
                        }
                        continue;
                    }
                };

                if let Some(expected) = field_schema.get("type").and_then(|t| t.as_str()) {
                    if !matches_type(value, expected) {
                        violations.push(format!("field '{}' should be {}, got {}", field, expected, value));
                    }
                }

                if let Some(allowed) = field_schema.get("enum").and_then(|e| e.as_array()) {
                    if !allowed.contains(value) {
                        violations.push(format!("field '{}' value {} not in {:?}", field, value, allowed));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{} violations: {}", self.name, violations.join("; "))
        }
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Loads and indexes contracts from the JSON files
pub struct ContractLoader {
    contracts: HashMap<String, Contract>,
    contracts_dir: PathBuf,
}

impl ContractLoader {
    pub fn new<P: AsRef<Path>>(contracts_dir: P) -> Self {
        Self {
            contracts: HashMap::new(),
            contracts_dir: contracts_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load_mqtt_contracts(&mut self) -> Result<usize> {
        let mqtt_dir = self.contracts_dir.join("mqtt");
        self.load_contracts_from_dir(&mqtt_dir)
    }

    pub fn load_http_contracts(&mut self) -> Result<usize> {
        let http_dir = self.contracts_dir.join("http");
        self.load_contracts_from_dir(&http_dir)
    }

    /// Loads MQTT and HTTP contracts
    pub fn load_all_contracts(&mut self) -> Result<usize> {
        let mqtt_count = self.load_mqtt_contracts()?;
        let http_count = self.load_http_contracts()?;
        Ok(mqtt_count + http_count)
    }

    fn load_contracts_from_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            log::warn!("Contracts directory not found: {}", dir.display());
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                match self.load_contract(&path) {
                    Ok(contract) => {
                        log::info!("Loaded contract: {}", contract.name);
                        self.contracts.insert(contract.name.clone(), contract);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to load contract {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(count)
    }

    fn load_contract(&self, path: &Path) -> Result<Contract> {
        let content = std::fs::read_to_string(path)?;
        let json: Value = serde_json::from_str(&content)?;

        let fallback_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let contract = Contract {
            name: json.get("name").and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or(fallback_name),
            version: json.get("version").and_then(|v| v.as_str())
                .unwrap_or("v1").to_string(),
            topic: json.get("topic").and_then(|v| v.as_str())
                .unwrap_or("").to_string(),
            contract_type: json.get("type").and_then(|v| v.as_str())
                .unwrap_or("event").to_string(),
            schema: json.get("schema").cloned().unwrap_or_else(|| Value::Object(Map::new())),
            description: json.get("description").and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        };

        Ok(contract)
    }

    pub fn get_contract(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    pub fn list_contracts(&self) -> Vec<&Contract> {
        self.contracts.values().collect()
    }

    /// Validates `payload` against the named contract
    pub fn validate(&self, name: &str, payload: &Value) -> Result<()> {
        match self.get_contract(name) {
            Some(contract) => contract.validate(payload),
            None => anyhow::bail!("Contract not found: {}", name),
        }
    }
}
