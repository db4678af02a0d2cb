//! Deterministic naming and name validation.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, TopologyError};

pub const DEFAULT_BUCKET_PREFIX: &str = "vpc-endpoints-bucket-test";
pub const DEFAULT_ASSETS_PREFIX: &str = "vpc-endpoints-assets";

const MAX_ENVIRONMENT_ID: usize = 40;

fn environment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("static regex"))
}

fn bucket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("static regex"))
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("static regex"))
}

fn secret_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9/_+=.@-]{1,512}$").expect("static regex"))
}

/// Environment ids (account or project ids) become part of globally unique
/// names, so they are limited to lowercase letters, digits and inner hyphens.
pub fn validate_environment_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(TopologyError::missing_input("environment id"));
    }
    if id.len() > MAX_ENVIRONMENT_ID {
        return Err(TopologyError::validation(format!(
            "environment id '{id}' exceeds {MAX_ENVIRONMENT_ID} characters"
        )));
    }
    if !environment_re().is_match(id) {
        return Err(TopologyError::validation(format!(
            "environment id '{id}' must use lowercase letters, digits and inner hyphens"
        )));
    }
    Ok(())
}

pub fn validate_bucket_name(name: &str) -> Result<()> {
    if !bucket_re().is_match(name) || name.contains("..") || ipv4_re().is_match(name) {
        return Err(TopologyError::validation(format!("'{name}' is not a valid S3 bucket name")));
    }
    Ok(())
}

/// `<prefix>-<environment id>`. Injective for a fixed prefix, so two
/// environments never share a bucket.
pub fn bucket_name(prefix: &str, environment_id: &str) -> Result<String> {
    validate_environment_id(environment_id)?;
    let name = format!("{prefix}-{environment_id}");
    validate_bucket_name(&name)?;
    Ok(name)
}

pub fn assets_bucket_name(environment_id: &str) -> Result<String> {
    bucket_name(DEFAULT_ASSETS_PREFIX, environment_id)
}

pub fn validate_secret_name(name: &str) -> Result<()> {
    if !secret_name_re().is_match(name) {
        return Err(TopologyError::validation(format!("'{name}' is not a valid secret name")));
    }
    Ok(())
}
