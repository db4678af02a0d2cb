use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use vpce_core::{Graph, GraphError};

use crate::intrinsic::{is_pseudo, references};

pub const TEMPLATE_VERSION: &str = "2010-09-09";
pub const TEMPLATE_FILE: &str = "template.json";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("{from} references {to}, which is not in the template")]
    Dangling { from: String, to: String },
    #[error("properties of {0} must be a JSON object")]
    NotAnObject(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(rename = "Properties", default)]
    pub properties: JsonMap<String, Json>,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnExport {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnOutput {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: Json,
    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<CfnExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, CfnResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, CfnOutput>,
}

impl CfnTemplate {
    /// Renders every resource of the graph. Dependencies already carried by a
    /// reference stay implicit; the rest become `DependsOn`.
    pub fn from_graph(
        graph: &Graph,
        description: impl Into<String>,
        outputs: BTreeMap<String, CfnOutput>,
    ) -> Result<Self, RenderError> {
        let mut resources = BTreeMap::new();
        for r in graph.ordered()? {
            let id = r.id().as_str().to_string();
            let properties = match r.properties() {
                Json::Object(m) => m,
                _ => return Err(RenderError::NotAnObject(id)),
            };
            let props_json = Json::Object(properties.clone());
            let referenced = references(&props_json);
            check_targets(&id, &referenced, graph)?;
            let depends_on: Vec<String> = r.deps().into_iter()
                .map(|d| d.0)
                .filter(|d| !referenced.contains(d))
                .collect();
            let policy = r.deletion_policy().map(|p| p.as_str().to_string());
            debug!(id = %id, kind = r.kind(), depends_on = depends_on.len(), "rendered resource");
            resources.insert(id, CfnResource {
                type_name: r.kind().to_string(),
                properties,
                depends_on,
                deletion_policy: policy.clone(),
                update_replace_policy: policy,
            });
        }
        for (name, out) in &outputs {
            check_targets(name, &references(&out.value), graph)?;
        }
        Ok(Self {
            version: Some(TEMPLATE_VERSION.to_string()),
            description: Some(description.into()),
            resources,
            outputs,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<Json> { serde_json::to_value(self) }
}

fn check_targets(from: &str, referenced: &std::collections::BTreeSet<String>, graph: &Graph) -> Result<(), RenderError> {
    for to in referenced {
        if is_pseudo(to) { continue; }
        if !graph.contains(&vpce_core::ResourceId(to.clone())) {
            return Err(RenderError::Dangling { from: from.to_string(), to: to.clone() });
        }
    }
    Ok(())
}

/// Writes `<out>/template.json` and returns its path.
pub fn write_template(tpl: &CfnTemplate, out: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
    let path = out.join(TEMPLATE_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(tpl)?)
        .with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), resources = tpl.resources.len(), "template written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsic::{get_att, pseudo, reference, REGION};
    use serde_json::json;
    use std::collections::BTreeSet;
    use vpce_core::{DeletionPolicy, Resource, ResourceId};

    #[derive(Debug)]
    struct Stub { id: ResourceId, deps: BTreeSet<ResourceId>, props: Json, retain: bool }

    impl Resource for Stub {
        fn id(&self) -> &ResourceId { &self.id }
        fn kind(&self) -> &'static str { "AWS::Test::Stub" }
        fn deps(&self) -> BTreeSet<ResourceId> { self.deps.clone() }
        fn properties(&self) -> Json { self.props.clone() }
        fn deletion_policy(&self) -> Option<DeletionPolicy> {
            self.retain.then_some(DeletionPolicy::Retain)
        }
    }

    fn rid(s: &str) -> ResourceId { ResourceId::new(s).unwrap() }

    fn stub(id: &str, deps: &[&str], props: Json) -> Stub {
        Stub { id: rid(id), deps: deps.iter().map(|d| rid(d)).collect(), props, retain: false }
    }

    #[test]
    fn referenced_deps_stay_implicit() {
        let mut g = Graph::new();
        g.add(stub("Vpc", &[], json!({}))).unwrap();
        g.add(stub("Endpoint", &["Vpc"], json!({}))).unwrap();
        g.add(stub("Fn", &["Vpc", "Endpoint"], json!({ "VpcId": reference(&rid("Vpc")), "Region": pseudo(REGION) }))).unwrap();
        let tpl = CfnTemplate::from_graph(&g, "test", BTreeMap::new()).unwrap();
        assert_eq!(tpl.resources["Fn"].depends_on, vec!["Endpoint".to_string()]);
        assert_eq!(tpl.version.as_deref(), Some(TEMPLATE_VERSION));
        let j = tpl.to_json().unwrap();
        assert!(j["Resources"]["Vpc"].get("DependsOn").is_none());
        assert!(j.get("Outputs").is_none());
    }

    #[test]
    fn undeclared_reference_is_dangling() {
        let mut g = Graph::new();
        g.add(stub("Fn", &[], json!({ "Role": get_att(&rid("Missing"), "Arn") }))).unwrap();
        let err = CfnTemplate::from_graph(&g, "test", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RenderError::Dangling { ref to, .. } if to == "Missing"));
    }

    #[test]
    fn output_references_are_checked() {
        let mut g = Graph::new();
        g.add(stub("Api", &[], json!({}))).unwrap();
        let mut outputs = BTreeMap::new();
        outputs.insert("Url".to_string(), CfnOutput {
            description: None,
            value: reference(&rid("Nope")),
            export: None,
        });
        assert!(CfnTemplate::from_graph(&g, "test", outputs).is_err());
    }

    #[test]
    fn deletion_policy_sets_both_fields() {
        let mut g = Graph::new();
        let mut s = stub("Bucket", &[], json!({}));
        s.retain = true;
        g.add(s).unwrap();
        let tpl = CfnTemplate::from_graph(&g, "test", BTreeMap::new()).unwrap();
        assert_eq!(tpl.resources["Bucket"].deletion_policy.as_deref(), Some("Retain"));
        assert_eq!(tpl.resources["Bucket"].update_replace_policy.as_deref(), Some("Retain"));
    }

    #[test]
    fn non_object_properties_are_rejected() {
        let mut g = Graph::new();
        g.add(stub("Odd", &[], json!([1, 2]))).unwrap();
        assert!(matches!(
            CfnTemplate::from_graph(&g, "test", BTreeMap::new()),
            Err(RenderError::NotAnObject(_))
        ));
    }

    #[test]
    fn writes_pretty_template() {
        let mut g = Graph::new();
        g.add(stub("Vpc", &[], json!({ "CidrBlock": "10.0.0.0/16" }))).unwrap();
        let tpl = CfnTemplate::from_graph(&g, "test", BTreeMap::new()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(&tpl, &dir.path().join("out")).unwrap();
        let back: CfnTemplate = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, tpl);
    }
}
