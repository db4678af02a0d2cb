use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use vpce_core::{DeletionPolicy, Resource, ResourceId};

/// JSON template with one fixed field; the store fills in `generated_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretTemplate {
    pub static_key: String,
    pub static_value: String,
    pub generated_key: String,
}

impl Default for SecretTemplate {
    fn default() -> Self {
        Self {
            static_key: "username".to_string(),
            static_value: "postgres".to_string(),
            generated_key: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: ResourceId,
    pub name: String,
    pub template: SecretTemplate,
    #[serde(default)]
    pub exclude_characters: Option<String>,
    #[serde(default)]
    pub password_length: Option<u32>,
}

impl Secret {
    /// `Ref` on a secret resolves to its ARN.
    pub fn arn(&self) -> Json { json!({ "Ref": self.id.as_str() }) }
}

impl Resource for Secret {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::SecretsManager::Secret" }
    fn properties(&self) -> Json {
        let fixed = json!({ &self.template.static_key: self.template.static_value });
        let mut generate = json!({
            "SecretStringTemplate": fixed.to_string(),
            "GenerateStringKey": self.template.generated_key,
        });
        if let Some(x) = &self.exclude_characters { generate["ExcludeCharacters"] = json!(x); }
        if let Some(n) = self.password_length { generate["PasswordLength"] = json!(n); }
        json!({ "Name": self.name, "GenerateSecretString": generate })
    }
    fn deletion_policy(&self) -> Option<DeletionPolicy> { Some(DeletionPolicy::Delete) }
}
