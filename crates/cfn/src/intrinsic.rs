//! CloudFormation intrinsic functions and reference scanning.

use regex::Regex;
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use vpce_core::ResourceId;

pub const PARTITION: &str = "AWS::Partition";
pub const REGION: &str = "AWS::Region";
pub const URL_SUFFIX: &str = "AWS::URLSuffix";

pub fn reference(id: &ResourceId) -> Json { json!({ "Ref": id.as_str() }) }

pub fn pseudo(name: &str) -> Json { json!({ "Ref": name }) }

pub fn get_att(id: &ResourceId, attr: &str) -> Json {
    json!({ "Fn::GetAtt": [id.as_str(), attr] })
}

pub fn join(sep: &str, parts: Vec<Json>) -> Json { json!({ "Fn::Join": [sep, parts] }) }

pub fn sub(template: impl Into<String>) -> Json { json!({ "Fn::Sub": template.into() }) }

pub fn select(index: usize, list: Json) -> Json { json!({ "Fn::Select": [index, list] }) }

pub fn get_azs() -> Json { json!({ "Fn::GetAZs": "" }) }

/// `com.amazonaws.<region>.<service>`
pub fn service_endpoint(service: &str) -> Json {
    join("", vec![json!("com.amazonaws."), pseudo(REGION), json!(format!(".{service}"))])
}

pub fn is_pseudo(name: &str) -> bool { name.starts_with("AWS::") }

fn sub_var() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^!}][^}]*)\}").expect("static regex"))
}

/// Logical ids (and pseudo parameters) referenced anywhere inside `v` through
/// `Ref`, `Fn::GetAtt` or `${...}` in `Fn::Sub`.
pub fn references(v: &Json) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect(v, &mut out);
    out
}

fn collect(v: &Json, out: &mut BTreeSet<String>) {
    match v {
        Json::Array(items) => items.iter().for_each(|i| collect(i, out)),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::String(id)) = map.get("Ref") {
                    out.insert(id.clone());
                    return;
                }
                if let Some(att) = map.get("Fn::GetAtt") {
                    match att {
                        Json::Array(parts) => {
                            if let Some(Json::String(id)) = parts.first() { out.insert(id.clone()); }
                        }
                        Json::String(dotted) => {
                            if let Some(id) = dotted.split('.').next() { out.insert(id.to_string()); }
                        }
                        _ => {}
                    }
                    return;
                }
                if let Some(s) = map.get("Fn::Sub") {
                    match s {
                        Json::String(t) => sub_refs(t, &BTreeSet::new(), out),
                        Json::Array(parts) => {
                            let locals: BTreeSet<String> = parts.get(1)
                                .and_then(|m| m.as_object())
                                .map(|m| m.keys().cloned().collect())
                                .unwrap_or_default();
                            if let Some(Json::String(t)) = parts.first() { sub_refs(t, &locals, out); }
                            if let Some(m) = parts.get(1) { collect(m, out); }
                        }
                        _ => {}
                    }
                    return;
                }
            }
            map.values().for_each(|i| collect(i, out));
        }
        _ => {}
    }
}

fn sub_refs(template: &str, locals: &BTreeSet<String>, out: &mut BTreeSet<String>) {
    for cap in sub_var().captures_iter(template) {
        let var = &cap[1];
        // AWS::Region has no attribute part; Bucket.Arn does.
        let id = if is_pseudo(var) { var } else { var.split('.').next().unwrap_or(var) };
        if !locals.contains(id) {
            out.insert(id.to_string());
        }
    }
}

/// Referenced logical ids, pseudo parameters removed.
pub fn resource_references(v: &Json) -> BTreeSet<ResourceId> {
    references(v).into_iter()
        .filter(|r| !is_pseudo(r))
        .map(ResourceId)
        .collect()
}
