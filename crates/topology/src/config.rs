//! Topology configuration, loaded from YAML.
//!
//! Only `environment_id` and `storage.content_seed` are required; everything
//! else defaults to the reference deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use vpce_aws::{Architecture, SecretTemplate};
use vpce_core::DeletionPolicy;

use crate::error::{Result, TopologyError};
use crate::naming;

pub const DEFAULT_STACK_NAME: &str = "LambdaVpcEndpointsStack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    pub environment_id: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub secret: SecretConfig,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "NetworkConfig::default_name")]
    pub name: String,
    #[serde(default = "NetworkConfig::default_cidr")]
    pub cidr: String,
    /// Prefix length of each isolated subnet.
    #[serde(default = "NetworkConfig::default_cidr_mask")]
    pub cidr_mask: u8,
    #[serde(default = "NetworkConfig::default_max_azs")]
    pub max_azs: usize,
}

impl NetworkConfig {
    fn default_name() -> String { "LambdaVPCEndpoints".to_string() }
    fn default_cidr() -> String { "10.0.0.0/16".to_string() }
    fn default_cidr_mask() -> u8 { 24 }
    fn default_max_azs() -> usize { 2 }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            cidr: Self::default_cidr(),
            cidr_mask: Self::default_cidr_mask(),
            max_azs: Self::default_max_azs(),
        }
    }
}

/// What happens to the bucket when the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Teardown {
    /// Remove the bucket and everything in it.
    #[default]
    Destroy,
    /// Keep the bucket and its objects.
    Retain,
}

impl Teardown {
    pub fn deletion_policy(&self) -> DeletionPolicy {
        match self { Teardown::Destroy => DeletionPolicy::Delete, Teardown::Retain => DeletionPolicy::Retain }
    }

    pub fn empties_contents(&self) -> bool { matches!(self, Teardown::Destroy) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
    pub name: String,
    /// Object key of the handler bundle inside the code bucket.
    pub code_key: String,
    /// The one environment variable naming the function's dependency.
    pub env_var: String,
    #[serde(default = "FunctionConfig::default_runtime")]
    pub runtime: String,
    #[serde(default = "FunctionConfig::default_handler")]
    pub handler: String,
    #[serde(default = "FunctionConfig::default_memory_mb")]
    pub memory_mb: u32,
    #[serde(default = "FunctionConfig::default_timeout_secs")]
    pub timeout_secs: u32,
    #[serde(default = "FunctionConfig::default_architecture")]
    pub architecture: Architecture,
}

impl FunctionConfig {
    fn default_runtime() -> String { "python3.9".to_string() }
    fn default_handler() -> String { "index.lambda_handler".to_string() }
    fn default_memory_mb() -> u32 { 1024 }
    fn default_timeout_secs() -> u32 { 60 }
    fn default_architecture() -> Architecture { Architecture::Arm64 }

    fn with_names(name: &str, code_key: &str, env_var: &str) -> Self {
        Self {
            name: name.to_string(),
            code_key: code_key.to_string(),
            env_var: env_var.to_string(),
            runtime: Self::default_runtime(),
            handler: Self::default_handler(),
            memory_mb: Self::default_memory_mb(),
            timeout_secs: Self::default_timeout_secs(),
            architecture: Self::default_architecture(),
        }
    }

    pub fn storage_default() -> Self { Self::with_names("readS3Lambda", "read_s3.zip", "S3_BUCKET") }

    pub fn secret_default() -> Self {
        Self::with_names("readSecretsManagerLambda", "read_secrets_manager.zip", "SECRET_NAME")
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > 64
            || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TopologyError::validation(format!("invalid function name '{}'", self.name)));
        }
        if !(128..=10240).contains(&self.memory_mb) {
            return Err(TopologyError::validation(format!(
                "{}: memory {} MB outside 128..=10240", self.name, self.memory_mb
            )));
        }
        if !(1..=900).contains(&self.timeout_secs) {
            return Err(TopologyError::validation(format!(
                "{}: timeout {} s outside 1..=900", self.name, self.timeout_secs
            )));
        }
        if self.env_var.is_empty()
            || !self.env_var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || self.env_var.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(TopologyError::validation(format!(
                "{}: invalid environment variable name '{}'", self.name, self.env_var
            )));
        }
        if self.code_key.is_empty() || self.handler.is_empty() || self.runtime.is_empty() {
            return Err(TopologyError::missing_input(format!("{}: code key, handler and runtime", self.name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_bucket_prefix")]
    pub bucket_prefix: String,
    /// Directory of static files synced into the bucket once per deploy.
    pub content_seed: PathBuf,
    #[serde(default)]
    pub teardown: Teardown,
    #[serde(default = "FunctionConfig::storage_default")]
    pub function: FunctionConfig,
    #[serde(default = "StorageConfig::default_api_name")]
    pub api_name: String,
    #[serde(default = "StorageConfig::default_export_name")]
    pub export_name: String,
}

impl StorageConfig {
    fn default_bucket_prefix() -> String { naming::DEFAULT_BUCKET_PREFIX.to_string() }
    fn default_api_name() -> String { "readS3ApiGateway".to_string() }
    fn default_export_name() -> String { "readS3ApiGatewayExport".to_string() }

    pub fn new(content_seed: impl Into<PathBuf>) -> Self {
        Self {
            bucket_prefix: Self::default_bucket_prefix(),
            content_seed: content_seed.into(),
            teardown: Teardown::default(),
            function: FunctionConfig::storage_default(),
            api_name: Self::default_api_name(),
            export_name: Self::default_export_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretConfig {
    #[serde(default = "SecretConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub template: SecretTemplate,
    #[serde(default)]
    pub exclude_characters: Option<String>,
    #[serde(default)]
    pub password_length: Option<u32>,
    #[serde(default = "FunctionConfig::secret_default")]
    pub function: FunctionConfig,
    #[serde(default = "SecretConfig::default_api_name")]
    pub api_name: String,
    #[serde(default = "SecretConfig::default_export_name")]
    pub export_name: String,
}

impl SecretConfig {
    fn default_name() -> String { "LambdaVPCSecret".to_string() }
    fn default_api_name() -> String { "readSecretsManagerApiGateway".to_string() }
    fn default_export_name() -> String { "readSecretsManagerApiGatewayExport".to_string() }
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            template: SecretTemplate::default(),
            exclude_characters: None,
            password_length: None,
            function: FunctionConfig::secret_default(),
            api_name: Self::default_api_name(),
            export_name: Self::default_export_name(),
        }
    }
}

/// Where the opaque handler bundles live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Defaults to `vpc-endpoints-assets-<environment id>`.
    #[serde(default)]
    pub code_bucket: Option<String>,
    /// Holds one directory per function, named after its code key without
    /// the extension (`read_s3/` for `read_s3.zip`). When set, deploy zips and
    /// uploads them; otherwise the bundles must already be in the code bucket.
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
}

/// A handler directory and the code bucket key its zip is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBundle {
    pub source: PathBuf,
    pub key: String,
}

impl TopologyConfig {
    pub fn new(environment_id: impl Into<String>, content_seed: impl Into<PathBuf>) -> Self {
        Self {
            environment_id: environment_id.into(),
            region: None,
            stack_name: None,
            network: NetworkConfig::default(),
            storage: StorageConfig::new(content_seed),
            secret: SecretConfig::default(),
            handlers: HandlerConfig::default(),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Loads a config file. Relative `content_seed` and `handlers.source_dir`
    /// are resolved against the file's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| TopologyError::Io { path: path.to_path_buf(), source })?;
        let mut cfg = Self::from_yaml_str(&raw)?;
        if cfg.storage.content_seed.is_relative() {
            if let Some(dir) = path.parent() {
                cfg.storage.content_seed = dir.join(&cfg.storage.content_seed);
            }
        }
        if let (Some(src), Some(dir)) = (&cfg.handlers.source_dir, path.parent()) {
            if src.is_relative() {
                cfg.handlers.source_dir = Some(dir.join(src));
            }
        }
        debug!(path = %path.display(), environment_id = %cfg.environment_id, "config loaded");
        Ok(cfg)
    }

    pub fn with_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = environment_id.into();
        self
    }

    pub fn stack_name(&self) -> &str { self.stack_name.as_deref().unwrap_or(DEFAULT_STACK_NAME) }

    pub fn code_bucket(&self) -> Result<String> {
        match &self.handlers.code_bucket {
            Some(b) => {
                naming::validate_bucket_name(b)?;
                Ok(b.clone())
            }
            None => naming::assets_bucket_name(&self.environment_id),
        }
    }

    /// Handler directories to package, empty when no `source_dir` is set.
    pub fn handler_bundles(&self) -> Result<Vec<HandlerBundle>> {
        let Some(root) = &self.handlers.source_dir else { return Ok(Vec::new()) };
        [&self.storage.function, &self.secret.function]
            .into_iter()
            .map(|f| {
                let stem = Path::new(&f.code_key).file_stem().unwrap_or_default();
                let source = root.join(stem);
                if !source.is_dir() {
                    return Err(TopologyError::missing_input(format!(
                        "{}: handler directory {} does not exist", f.name, source.display()
                    )));
                }
                Ok(HandlerBundle { source, key: f.code_key.clone() })
            })
            .collect()
    }

    /// Static checks that need no filesystem access.
    pub fn validate(&self) -> Result<()> {
        naming::validate_environment_id(&self.environment_id)?;
        naming::validate_secret_name(&self.secret.name)?;
        let t = &self.secret.template;
        if t.static_key.is_empty() || t.generated_key.is_empty() {
            return Err(TopologyError::missing_input("secret template keys"));
        }
        if t.static_key == t.generated_key {
            return Err(TopologyError::validation(format!(
                "secret template key '{}' cannot be both static and generated", t.static_key
            )));
        }
        if let Some(n) = self.secret.password_length {
            if !(8..=4096).contains(&n) {
                return Err(TopologyError::validation(format!("password length {n} outside 8..=4096")));
            }
        }
        self.storage.function.validate()?;
        self.secret.function.validate()?;
        if self.storage.function.name == self.secret.function.name {
            return Err(TopologyError::validation(format!(
                "both paths use function name '{}'", self.storage.function.name
            )));
        }
        for api in [&self.storage.api_name, &self.secret.api_name] {
            if api.is_empty() {
                return Err(TopologyError::missing_input("front door name"));
            }
        }
        if self.storage.export_name == self.secret.export_name {
            return Err(TopologyError::validation(format!(
                "both front doors export '{}'", self.storage.export_name
            )));
        }
        self.code_bucket()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_takes_reference_defaults() {
        let cfg = TopologyConfig::from_yaml_str(r#"
environment_id: "123456789012"
storage:
  content_seed: ./s3bucket-dist
"#).unwrap();
        assert_eq!(cfg.network.name, "LambdaVPCEndpoints");
        assert_eq!(cfg.network.cidr_mask, 24);
        assert_eq!(cfg.storage.teardown, Teardown::Destroy);
        assert_eq!(cfg.storage.function.env_var, "S3_BUCKET");
        assert_eq!(cfg.storage.function.memory_mb, 1024);
        assert_eq!(cfg.secret.name, "LambdaVPCSecret");
        assert_eq!(cfg.secret.function.env_var, "SECRET_NAME");
        assert_eq!(cfg.secret.template.generated_key, "password");
        assert_eq!(cfg.stack_name(), DEFAULT_STACK_NAME);
        assert_eq!(cfg.code_bucket().unwrap(), "vpc-endpoints-assets-123456789012");
        cfg.validate().unwrap();
    }

    #[test]
    fn overrides_and_teardown_option() {
        let cfg = TopologyConfig::from_yaml_str(r#"
environment_id: dev
stack_name: Dev
storage:
  content_seed: /srv/seed
  teardown: retain
secret:
  template: { static_key: user, static_value: app, generated_key: token }
  function:
    name: readSecret
    code_key: secret.zip
    env_var: SECRET_NAME
    timeout_secs: 10
    architecture: x86_64
"#).unwrap();
        assert_eq!(cfg.storage.teardown.deletion_policy(), DeletionPolicy::Retain);
        assert!(!cfg.storage.teardown.empties_contents());
        assert_eq!(cfg.secret.function.timeout_secs, 10);
        assert_eq!(cfg.secret.function.memory_mb, 1024);
        assert_eq!(cfg.secret.function.architecture, Architecture::X86);
        assert_eq!(cfg.stack_name(), "Dev");
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = TopologyConfig::from_yaml_str(r#"
environment_id: dev
storage: { content_seed: x, bucket: nope }
"#).unwrap_err();
        assert!(matches!(err, TopologyError::Yaml(_)));
    }

    #[test]
    fn missing_content_seed_fails_to_parse() {
        assert!(TopologyConfig::from_yaml_str("environment_id: dev\nstorage: {}\n").is_err());
    }

    #[test]
    fn secret_keys_must_differ() {
        let mut cfg = TopologyConfig::new("dev", "seed");
        cfg.secret.template.generated_key = cfg.secret.template.static_key.clone();
        assert!(matches!(cfg.validate(), Err(TopologyError::Validation(_))));
    }

    #[test]
    fn function_limits_are_checked() {
        let mut cfg = TopologyConfig::new("dev", "seed");
        cfg.storage.function.memory_mb = 64;
        assert!(cfg.validate().is_err());
        let mut cfg = TopologyConfig::new("dev", "seed");
        cfg.secret.function.timeout_secs = 901;
        assert!(cfg.validate().is_err());
        let mut cfg = TopologyConfig::new("dev", "seed");
        cfg.secret.function.name = cfg.storage.function.name.clone();
        assert!(cfg.validate().is_err());
        let mut cfg = TopologyConfig::new("dev", "seed");
        cfg.storage.function.env_var = "1BUCKET".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_path_resolves_seed_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, "environment_id: dev\nstorage:\n  content_seed: dist\n").unwrap();
        let cfg = TopologyConfig::from_path(&path).unwrap();
        assert_eq!(cfg.storage.content_seed, dir.path().join("dist"));
        let cfg = cfg.with_environment("prod");
        assert_eq!(cfg.environment_id, "prod");
    }

    #[test]
    fn handler_bundles_follow_code_keys() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["read_s3", "read_secrets_manager"] {
            std::fs::create_dir_all(dir.path().join("lambdas").join(name)).unwrap();
        }
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, "environment_id: dev\nstorage:\n  content_seed: dist\nhandlers:\n  source_dir: lambdas\n").unwrap();
        let cfg = TopologyConfig::from_path(&path).unwrap();
        let bundles = cfg.handler_bundles().unwrap();
        assert_eq!(bundles, vec![
            HandlerBundle { source: dir.path().join("lambdas/read_s3"), key: "read_s3.zip".into() },
            HandlerBundle { source: dir.path().join("lambdas/read_secrets_manager"), key: "read_secrets_manager.zip".into() },
        ]);
    }

    #[test]
    fn missing_handler_directory_is_a_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = TopologyConfig::new("dev", "seed");
        assert!(cfg.handler_bundles().unwrap().is_empty());
        cfg.handlers.source_dir = Some(dir.path().to_path_buf());
        assert!(matches!(cfg.handler_bundles(), Err(TopologyError::MissingInput(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TopologyConfig::from_path(Path::new("/nonexistent/stack.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stack.yaml"));
    }
}
