use anyhow::Result;
use regex::Regex;
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};
use vpce_cfn::intrinsic::references;

/// Plan-time checks over a rendered CloudFormation template.
pub struct Policy { pub allow_unencrypted: bool }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    BucketEncryption,
    LeastPrivilege,
    IsolatedPlacement,
    SecretHygiene,
    FrontDoorWiring,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rule::BucketEncryption => "bucket-encryption",
            Rule::LeastPrivilege => "least-privilege",
            Rule::IsolatedPlacement => "isolated-placement",
            Rule::SecretHygiene => "secret-hygiene",
            Rule::FrontDoorWiring => "front-door-wiring",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: Rule,
    pub resource: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.resource, self.message)
    }
}

const EGRESS_TYPES: &[&str] = &[
    "AWS::EC2::InternetGateway",
    "AWS::EC2::VPCGatewayAttachment",
    "AWS::EC2::NatGateway",
    "AWS::EC2::EgressOnlyInternetGateway",
];

const DYNAMIC_SECRET_REFS: &[&str] = &["{{resolve:secretsmanager:", "{{resolve:ssm-secure:"];

fn arn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^arn:[^:]+:([^:]+):[^:]*:[^:]*:(.+)$").expect("static regex"))
}

fn sub_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{[^}]+\}").expect("static regex"))
}

struct Template<'a> { resources: BTreeMap<&'a str, (&'a str, &'a Json)> }

impl<'a> Template<'a> {
    fn new(tpl: &'a Json) -> Self {
        let mut resources = BTreeMap::new();
        if let Some(map) = tpl.get("Resources").and_then(|r| r.as_object()) {
            for (id, r) in map {
                let ty = r.get("Type").and_then(|t| t.as_str()).unwrap_or_default();
                let props = r.get("Properties").unwrap_or(&Json::Null);
                resources.insert(id.as_str(), (ty, props));
            }
        }
        Self { resources }
    }

    fn of_type(&self, ty: &'a str) -> impl Iterator<Item = (&'a str, &'a Json)> + '_ {
        self.resources.iter().filter(move |(_, (t, _))| *t == ty).map(|(id, (_, p))| (*id, *p))
    }

    fn type_of(&self, id: &str) -> Option<&'a str> { self.resources.get(id).map(|(t, _)| *t) }
}

fn ref_target(v: &Json) -> Option<&str> { v.get("Ref").and_then(|r| r.as_str()) }

fn getatt_target(v: &Json) -> Option<&str> {
    v.get("Fn::GetAtt").and_then(|a| a.get(0)).and_then(|id| id.as_str())
}

fn as_list(v: Option<&Json>) -> Vec<&Json> {
    match v {
        Some(Json::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

impl Policy {
    pub fn new(allow_unencrypted: bool) -> Self { Self { allow_unencrypted } }

    pub fn check_template(&self, tpl: &Json) -> Result<()> {
        let violations = self.violations(tpl);
        if violations.is_empty() {
            debug!("policy checks passed");
            return Ok(());
        }
        for v in &violations { warn!(rule = %v.rule, resource = %v.resource, "{}", v.message); }
        let msg = violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\n  ");
        anyhow::bail!("Policy: {} violation(s):\n  {}", violations.len(), msg)
    }

    pub fn violations(&self, tpl: &Json) -> Vec<Violation> {
        let t = Template::new(tpl);
        let mut out = Vec::new();
        self.check_buckets(&t, &mut out);
        check_grants(&t, &mut out);
        check_placement(&t, &mut out);
        check_secret_hygiene(&t, &mut out);
        check_front_doors(&t, &mut out);
        out
    }

    fn check_buckets(&self, t: &Template, out: &mut Vec<Violation>) {
        if self.allow_unencrypted { return; }
        for (id, bucket) in t.of_type("AWS::S3::Bucket") {
            if bucket.get("BucketEncryption").is_none() {
                out.push(Violation {
                    rule: Rule::BucketEncryption,
                    resource: id.to_string(),
                    message: "S3 bucket requires encryption (SSE-S3 or KMS)".to_string(),
                });
            }
        }
    }
}

fn check_grants(t: &Template, out: &mut Vec<Violation>) {
    for (id, policy) in t.of_type("AWS::IAM::Policy") {
        let doc = policy.get("PolicyDocument");
        for stmt in as_list(doc.and_then(|d| d.get("Statement"))) {
            for action in as_list(stmt.get("Action")) {
                let a = action.as_str().unwrap_or_default();
                if a == "*" || a.ends_with(":*") {
                    out.push(Violation {
                        rule: Rule::LeastPrivilege,
                        resource: id.to_string(),
                        message: format!("action '{a}' grants a whole service"),
                    });
                }
            }
            let resources = as_list(stmt.get("Resource"));
            if resources.is_empty() {
                out.push(Violation {
                    rule: Rule::LeastPrivilege,
                    resource: id.to_string(),
                    message: "statement has no resource scope".to_string(),
                });
            }
            for r in resources {
                if let Err(why) = scope_is_single_instance(r, t) {
                    out.push(Violation { rule: Rule::LeastPrivilege, resource: id.to_string(), message: why });
                }
            }
        }
    }
}

/// A scope must name one concrete resource, optionally followed by `/*` for
/// that resource's children.
fn scope_is_single_instance(r: &Json, t: &Template) -> std::result::Result<(), String> {
    if let Some(target) = ref_target(r).or_else(|| getatt_target(r)) {
        return match t.type_of(target) {
            Some(_) => Ok(()),
            None => Err(format!("scope references unknown resource '{target}'")),
        };
    }
    if let Some(s) = r.as_str() {
        return literal_scope(s);
    }
    if let Some(tpl) = r.get("Fn::Sub").and_then(|s| s.as_str().or_else(|| s.get(0).and_then(|x| x.as_str()))) {
        return literal_scope(&sub_var_re().replace_all(tpl, "x"));
    }
    if let Some(parts) = r.get("Fn::Join").and_then(|j| j.get(1)).and_then(|p| p.as_array()) {
        return join_scope(parts, t);
    }
    Err(format!("unsupported scope expression {r}"))
}

fn join_scope(parts: &[Json], t: &Template) -> std::result::Result<(), String> {
    // [<resource arn>, "/*"] or literal / pseudo pieces around at most one resource reference.
    match parts.first() {
        Some(head) if ref_target(head).map_or(false, |r| !r.starts_with("AWS::")) || getatt_target(head).is_some() => {
            scope_is_single_instance(head, t)?;
            let rest: Vec<&str> = parts[1..].iter().filter_map(|p| p.as_str()).collect();
            if rest.len() != parts.len() - 1 {
                return Err("joined scope mixes several resource references".to_string());
            }
            let target = ref_target(head).or_else(|| getatt_target(head)).unwrap_or_default();
            match rest.concat().as_str() {
                "" => Ok(()),
                "/*" if t.type_of(target) == Some("AWS::S3::Bucket") => Ok(()),
                other => Err(format!("suffix '{other}' widens the scope")),
            }
        }
        _ => {
            let mut flat = String::new();
            let mut resource_refs = 0;
            for p in parts {
                if let Some(s) = p.as_str() {
                    flat.push_str(s);
                    continue;
                }
                match ref_target(p).or_else(|| getatt_target(p)) {
                    Some(pseudo) if pseudo.starts_with("AWS::") && ref_target(p).is_some() => flat.push('x'),
                    Some(target) if resource_refs == 0 => {
                        if t.type_of(target).is_none() {
                            return Err(format!("scope references unknown resource '{target}'"));
                        }
                        resource_refs += 1;
                        flat.push('x');
                    }
                    Some(_) => return Err("joined scope mixes several resource references".to_string()),
                    None => return Err(format!("unsupported piece {p} in joined scope")),
                }
            }
            literal_scope(&flat)
        }
    }
}

/// Only an S3 bucket ARN may carry a trailing `/*`, and only for the objects
/// of that one bucket. Any other wildcard matches more than one resource.
fn literal_scope(s: &str) -> std::result::Result<(), String> {
    if s == "*" {
        return Err("scope '*' matches every resource".to_string());
    }
    let Some(caps) = arn_re().captures(s) else {
        return Err(format!("scope '{s}' is not an ARN"));
    };
    let (service, resource) = (&caps[1], &caps[2]);
    let base = match resource.strip_suffix("/*") {
        Some(bucket) if service == "s3" && !bucket.contains('/') => bucket,
        _ => resource,
    };
    if base.is_empty() || base.contains('*') || base.contains('?') {
        return Err(format!("scope '{s}' matches more than one resource"));
    }
    Ok(())
}

fn check_placement(t: &Template, out: &mut Vec<Violation>) {
    for ty in EGRESS_TYPES {
        for (id, _) in t.of_type(ty) {
            out.push(Violation {
                rule: Rule::IsolatedPlacement,
                resource: id.to_string(),
                message: format!("{ty} gives the network an external route"),
            });
        }
    }
    let routed: BTreeSet<&str> = t.of_type("AWS::EC2::Route")
        .filter_map(|(_, r)| r.get("RouteTableId").and_then(ref_target))
        .collect();
    let mut table_of: BTreeMap<&str, &str> = BTreeMap::new();
    for (_, a) in t.of_type("AWS::EC2::SubnetRouteTableAssociation") {
        if let (Some(sn), Some(rt)) = (a.get("SubnetId").and_then(ref_target), a.get("RouteTableId").and_then(ref_target)) {
            table_of.insert(sn, rt);
        }
    }
    for (id, f) in t.of_type("AWS::Lambda::Function") {
        let subnets = as_list(f.get("VpcConfig").and_then(|v| v.get("SubnetIds")));
        if subnets.is_empty() {
            out.push(Violation {
                rule: Rule::IsolatedPlacement,
                resource: id.to_string(),
                message: "function is not placed inside the network".to_string(),
            });
            continue;
        }
        for s in subnets {
            let problem = match ref_target(s) {
                None => Some("subnet is not a template subnet".to_string()),
                Some(sn) if t.type_of(sn) != Some("AWS::EC2::Subnet") => Some(format!("'{sn}' is not a subnet")),
                Some(sn) => {
                    let public = t.resources.get(sn)
                        .and_then(|(_, p)| p.get("MapPublicIpOnLaunch"))
                        .and_then(|m| m.as_bool())
                        .unwrap_or(false);
                    match table_of.get(sn) {
                        _ if public => Some(format!("subnet '{sn}' maps public IPs")),
                        None => Some(format!("subnet '{sn}' has no route table association")),
                        Some(rt) if routed.contains(rt) => Some(format!("subnet '{sn}' has an external route")),
                        Some(_) => None,
                    }
                }
            };
            if let Some(message) = problem {
                out.push(Violation { rule: Rule::IsolatedPlacement, resource: id.to_string(), message });
            }
        }
    }
}

fn check_secret_hygiene(t: &Template, out: &mut Vec<Violation>) {
    for (id, s) in t.of_type("AWS::SecretsManager::Secret") {
        if s.get("SecretString").is_some() {
            out.push(Violation {
                rule: Rule::SecretHygiene,
                resource: id.to_string(),
                message: "secret value is embedded in the template; generate it in the store".to_string(),
            });
        }
    }
    for (id, f) in t.of_type("AWS::Lambda::Function") {
        let Some(vars) = f.get("Environment").and_then(|e| e.get("Variables")).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, value) in vars {
            let text = value.to_string();
            if DYNAMIC_SECRET_REFS.iter().any(|p| text.contains(p)) {
                out.push(Violation {
                    rule: Rule::SecretHygiene,
                    resource: id.to_string(),
                    message: format!("environment variable {name} resolves a secret value"),
                });
            }
            if getatt_targets(value).iter().any(|target| t.type_of(target) == Some("AWS::SecretsManager::Secret")) {
                out.push(Violation {
                    rule: Rule::SecretHygiene,
                    resource: id.to_string(),
                    message: format!("environment variable {name} reads an attribute of a secret"),
                });
            }
        }
    }
}

fn getatt_targets(v: &Json) -> Vec<&str> {
    let mut out = Vec::new();
    fn walk<'a>(v: &'a Json, out: &mut Vec<&'a str>) {
        match v {
            Json::Array(items) => items.iter().for_each(|i| walk(i, out)),
            Json::Object(map) => {
                if let Some(id) = getatt_target(v) { out.push(id); }
                map.values().for_each(|i| walk(i, out));
            }
            _ => {}
        }
    }
    walk(v, &mut out);
    out
}

fn check_front_doors(t: &Template, out: &mut Vec<Violation>) {
    let functions: BTreeSet<&str> = t.of_type("AWS::Lambda::Function").map(|(id, _)| id).collect();
    let lambda_refs = |v: &Json| -> BTreeSet<String> {
        references(v).into_iter().filter(|r| functions.contains(r.as_str())).collect()
    };

    let mut api_targets: BTreeMap<&str, BTreeSet<String>> =
        t.of_type("AWS::ApiGateway::RestApi").map(|(id, _)| (id, BTreeSet::new())).collect();
    for (id, m) in t.of_type("AWS::ApiGateway::Method") {
        let Some(api) = m.get("RestApiId").and_then(ref_target) else { continue };
        let targets = lambda_refs(m.get("Integration").unwrap_or(&Json::Null));
        match api_targets.get_mut(api) {
            Some(set) => set.extend(targets),
            None => out.push(Violation {
                rule: Rule::FrontDoorWiring,
                resource: id.to_string(),
                message: format!("method belongs to unknown REST API '{api}'"),
            }),
        }
    }

    let mut fronted_by: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (api, targets) in &api_targets {
        if targets.len() != 1 {
            out.push(Violation {
                rule: Rule::FrontDoorWiring,
                resource: api.to_string(),
                message: format!("front door must route to exactly one function, found {}", targets.len()),
            });
        }
        for f in targets { fronted_by.entry(f.clone()).or_default().push(*api); }
    }
    for (f, apis) in &fronted_by {
        if apis.len() > 1 {
            out.push(Violation {
                rule: Rule::FrontDoorWiring,
                resource: f.clone(),
                message: format!("function is fronted by several APIs: {}", apis.join(", ")),
            });
        }
    }

    // invoke permissions must point at the function their API integrates
    for (id, p) in t.of_type("AWS::Lambda::Permission") {
        if p.get("Principal").and_then(|x| x.as_str()) != Some("apigateway.amazonaws.com") { continue; }
        let source: BTreeSet<String> = references(p.get("SourceArn").unwrap_or(&Json::Null));
        let granted = lambda_refs(p.get("FunctionName").unwrap_or(&Json::Null));
        for (api, targets) in &api_targets {
            if source.contains(*api) && granted.iter().any(|g| !targets.contains(g)) {
                out.push(Violation {
                    rule: Rule::FrontDoorWiring,
                    resource: id.to_string(),
                    message: format!("permission for '{api}' names a function the API does not integrate"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map as JsonMap};

    fn template_from_resources(resources: JsonMap<String, Json>) -> Json {
        json!({ "Resources": resources })
    }

    fn network() -> JsonMap<String, Json> {
        let mut r = JsonMap::new();
        r.insert("Vpc".into(), json!({ "Type": "AWS::EC2::VPC", "Properties": { "CidrBlock": "10.0.0.0/16" } }));
        r.insert("Sn1".into(), json!({ "Type": "AWS::EC2::Subnet", "Properties": { "VpcId": { "Ref": "Vpc" }, "MapPublicIpOnLaunch": false } }));
        r.insert("Rt1".into(), json!({ "Type": "AWS::EC2::RouteTable", "Properties": { "VpcId": { "Ref": "Vpc" } } }));
        r.insert("Assoc1".into(), json!({ "Type": "AWS::EC2::SubnetRouteTableAssociation", "Properties": {
            "SubnetId": { "Ref": "Sn1" }, "RouteTableId": { "Ref": "Rt1" } } }));
        r.insert("Bucket".into(), json!({ "Type": "AWS::S3::Bucket", "Properties": {
            "BucketName": "b", "BucketEncryption": {} } }));
        r.insert("Fn".into(), json!({ "Type": "AWS::Lambda::Function", "Properties": {
            "VpcConfig": { "SubnetIds": [{ "Ref": "Sn1" }] },
            "Environment": { "Variables": { "S3_BUCKET": "b" } } } }));
        r
    }

    fn grant(resources: Json) -> Json {
        json!({ "Type": "AWS::IAM::Policy", "Properties": { "PolicyDocument": { "Statement": [{
            "Action": ["s3:ListBucket", "s3:GetObject"], "Effect": "Allow", "Resource": resources }] } } })
    }

    fn rules(tpl: &Json) -> Vec<Rule> {
        Policy::new(false).violations(tpl).into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn clean_network_passes() {
        let tpl = template_from_resources(network());
        assert!(Policy::new(false).check_template(&tpl).is_ok());
    }

    #[test]
    fn unencrypted_bucket_needs_opt_in() {
        let mut r = network();
        r.insert("Bucket".into(), json!({ "Type": "AWS::S3::Bucket", "Properties": { "BucketName": "b" } }));
        let tpl = template_from_resources(r);
        assert_eq!(rules(&tpl), vec![Rule::BucketEncryption]);
        assert!(Policy::new(true).check_template(&tpl).is_ok());
    }

    #[test]
    fn bucket_and_children_scope_is_accepted() {
        let mut r = network();
        r.insert("Grant".into(), grant(json!([
            { "Fn::GetAtt": ["Bucket", "Arn"] },
            { "Fn::Join": ["", [{ "Fn::GetAtt": ["Bucket", "Arn"] }, "/*"]] },
            "arn:aws:s3:::b/*",
            { "Fn::Sub": "arn:${AWS::Partition}:s3:::b" },
        ])));
        assert!(rules(&template_from_resources(r)).is_empty());
    }

    #[test]
    fn joined_arn_around_one_bucket_ref_is_accepted() {
        let mut r = network();
        r.insert("Grant".into(), grant(json!([
            { "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":s3:::", { "Ref": "Bucket" }, "/*"]] },
            { "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":s3:::", { "Ref": "Bucket" }]] },
        ])));
        assert!(rules(&template_from_resources(r)).is_empty());
    }

    #[test]
    fn joined_arn_around_two_refs_or_unknown_ref_is_rejected() {
        for scope in [
            json!({ "Fn::Join": ["", ["arn:aws:s3:::", { "Ref": "Bucket" }, { "Ref": "Fn" }]] }),
            json!({ "Fn::Join": ["", ["arn:aws:s3:::", { "Ref": "Nowhere" }, "/*"]] }),
            json!({ "Fn::Join": ["", ["arn:aws:s3:::", { "Ref": "Bucket" }, "*"]] }),
        ] {
            let mut r = network();
            r.insert("Grant".into(), grant(json!([scope.clone()])));
            assert_eq!(rules(&template_from_resources(r)), vec![Rule::LeastPrivilege], "scope {scope}");
        }
    }

    #[test]
    fn wildcard_scopes_are_rejected() {
        for scope in [json!("*"), json!("arn:aws:s3:::*"), json!("arn:aws:secretsmanager:us-east-1:1:secret:*"),
                      json!("arn:aws:iam::123456789012:role/*"),
                      json!("arn:aws:dynamodb:us-east-1:123456789012:table/*"),
                      json!("arn:aws:kms:us-east-1:123456789012:key/*"),
                      json!("arn:aws:s3:::b/logs/*"),
                      json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["Bucket", "Arn"] }, "*"]] }),
                      json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["Fn", "Arn"] }, "/*"]] })] {
            let mut r = network();
            r.insert("Grant".into(), grant(json!([scope.clone()])));
            assert_eq!(rules(&template_from_resources(r)), vec![Rule::LeastPrivilege], "scope {scope}");
        }
    }

    #[test]
    fn service_wide_actions_are_rejected() {
        let mut r = network();
        r.insert("Grant".into(), json!({ "Type": "AWS::IAM::Policy", "Properties": { "PolicyDocument": {
            "Statement": { "Action": "s3:*", "Effect": "Allow", "Resource": { "Ref": "Bucket" } } } } }));
        let v = Policy::new(false).violations(&template_from_resources(r));
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("s3:*"));
    }

    #[test]
    fn routed_subnet_is_not_isolated() {
        let mut r = network();
        r.insert("Igw".into(), json!({ "Type": "AWS::EC2::InternetGateway", "Properties": {} }));
        r.insert("DefaultRoute".into(), json!({ "Type": "AWS::EC2::Route", "Properties": {
            "RouteTableId": { "Ref": "Rt1" }, "GatewayId": { "Ref": "Igw" }, "DestinationCidrBlock": "0.0.0.0/0" } }));
        let v = rules(&template_from_resources(r));
        assert_eq!(v, vec![Rule::IsolatedPlacement, Rule::IsolatedPlacement]);
    }

    #[test]
    fn function_outside_network_is_flagged() {
        let mut r = network();
        r.insert("Loose".into(), json!({ "Type": "AWS::Lambda::Function", "Properties": {} }));
        let v = Policy::new(false).violations(&template_from_resources(r));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].resource, "Loose");
    }

    #[test]
    fn secret_values_never_reach_environment() {
        let mut r = network();
        r.insert("Secret".into(), json!({ "Type": "AWS::SecretsManager::Secret", "Properties": { "SecretString": "hunter2" } }));
        r.insert("Fn".into(), json!({ "Type": "AWS::Lambda::Function", "Properties": {
            "VpcConfig": { "SubnetIds": [{ "Ref": "Sn1" }] },
            "Environment": { "Variables": {
                "PASSWORD": "{{resolve:secretsmanager:LambdaVPCSecret:SecretString:password}}",
                "SECRET_NAME": "LambdaVPCSecret" } } } }));
        let v = Policy::new(false).violations(&template_from_resources(r));
        assert_eq!(v.iter().filter(|v| v.rule == Rule::SecretHygiene).count(), 2);
        assert!(v.iter().all(|v| !v.message.contains("SECRET_NAME")));
    }

    fn front_door(r: &mut JsonMap<String, Json>, api: &str, function: &str) {
        r.insert(api.into(), json!({ "Type": "AWS::ApiGateway::RestApi", "Properties": { "Name": api } }));
        r.insert(format!("{api}Any"), json!({ "Type": "AWS::ApiGateway::Method", "Properties": {
            "RestApiId": { "Ref": api },
            "Integration": { "Uri": { "Fn::Join": ["", ["arn:", { "Fn::GetAtt": [function, "Arn"] }, "/invocations"]] } } } }));
        r.insert(format!("{api}Invoke"), json!({ "Type": "AWS::Lambda::Permission", "Properties": {
            "FunctionName": { "Fn::GetAtt": [function, "Arn"] },
            "Principal": "apigateway.amazonaws.com",
            "SourceArn": { "Fn::Sub": format!("arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{api}}}/*/*") } } }));
    }

    #[test]
    fn two_front_doors_on_one_function_are_flagged() {
        let mut r = network();
        let twin = r["Fn"].clone();
        r.insert("Fn2".into(), twin);
        front_door(&mut r, "StorageApi", "Fn");
        front_door(&mut r, "SecretApi", "Fn");
        let v = Policy::new(false).violations(&template_from_resources(r));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule, Rule::FrontDoorWiring);
        assert_eq!(v[0].resource, "Fn");
    }

    #[test]
    fn one_front_door_per_function_passes() {
        let mut r = network();
        let twin = r["Fn"].clone();
        r.insert("Fn2".into(), twin);
        front_door(&mut r, "StorageApi", "Fn");
        front_door(&mut r, "SecretApi", "Fn2");
        assert!(rules(&template_from_resources(r)).is_empty());
    }

    #[test]
    fn permission_for_other_function_is_flagged() {
        let mut r = network();
        let twin = r["Fn"].clone();
        r.insert("Fn2".into(), twin);
        front_door(&mut r, "StorageApi", "Fn");
        r.insert("StorageApiInvoke".into(), json!({ "Type": "AWS::Lambda::Permission", "Properties": {
            "FunctionName": { "Fn::GetAtt": ["Fn2", "Arn"] },
            "Principal": "apigateway.amazonaws.com",
            "SourceArn": { "Fn::Sub": "arn:${AWS::Partition}:execute-api:${AWS::Region}:${AWS::AccountId}:${StorageApi}/*/*" } } }));
        assert_eq!(rules(&template_from_resources(r)), vec![Rule::FrontDoorWiring]);
    }

    #[test]
    fn api_without_methods_is_flagged() {
        let mut r = network();
        r.insert("Empty".into(), json!({ "Type": "AWS::ApiGateway::RestApi", "Properties": {} }));
        assert_eq!(rules(&template_from_resources(r)), vec![Rule::FrontDoorWiring]);
    }
}
