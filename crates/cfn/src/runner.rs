//! Drives the external provisioning engine through the `aws` CLI.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AwsCli {
    bin: PathBuf,
    region: Option<String>,
}

impl AwsCli {
    pub fn locate(region: Option<&str>) -> Result<Self> {
        let bin = which::which("aws").context("aws cli not found in PATH")?;
        Ok(Self::with_binary(bin, region))
    }

    pub fn with_binary(bin: impl Into<PathBuf>, region: Option<&str>) -> Self {
        Self { bin: bin.into(), region: region.map(str::to_string) }
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        if let Some(r) = &self.region { cmd.arg("--region").arg(r); }
        cmd
    }

    pub fn deploy_command(&self, stack_name: &str, template: &Path) -> Command {
        let mut cmd = self.command(["cloudformation", "deploy", "--stack-name", stack_name]);
        cmd.arg("--template-file").arg(template)
            .args(["--capabilities", "CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"])
            .arg("--no-fail-on-empty-changeset");
        cmd
    }

    pub fn delete_command(&self, stack_name: &str) -> Command {
        self.command(["cloudformation", "delete-stack", "--stack-name", stack_name])
    }

    pub fn wait_deleted_command(&self, stack_name: &str) -> Command {
        self.command(["cloudformation", "wait", "stack-delete-complete", "--stack-name", stack_name])
    }

    /// One-shot upload; objects missing locally are removed from the bucket.
    pub fn sync_command(&self, source: &Path, bucket: &str) -> Command {
        let url = format!("s3://{bucket}");
        let args: [&OsStr; 5] = ["s3".as_ref(), "sync".as_ref(), source.as_os_str(), url.as_ref(), "--delete".as_ref()];
        self.command(args)
    }

    pub fn empty_bucket_command(&self, bucket: &str) -> Command {
        let url = format!("s3://{bucket}");
        self.command(["s3", "rm", url.as_str(), "--recursive"])
    }

    pub fn head_bucket_command(&self, bucket: &str) -> Command {
        self.command(["s3api", "head-bucket", "--bucket", bucket])
    }

    pub fn make_bucket_command(&self, bucket: &str) -> Command {
        let url = format!("s3://{bucket}");
        self.command(["s3", "mb", url.as_str()])
    }

    pub fn upload_command(&self, file: &Path, bucket: &str, key: &str) -> Command {
        let url = format!("s3://{bucket}/{key}");
        let args: [&OsStr; 4] = ["s3".as_ref(), "cp".as_ref(), file.as_os_str(), url.as_ref()];
        self.command(args)
    }

    pub fn describe_command(&self, stack_name: &str) -> Command {
        self.command(["cloudformation", "describe-stacks", "--stack-name", stack_name, "--output", "json"])
    }

    pub fn deploy_stack(&self, stack_name: &str, template: &Path) -> Result<()> {
        info!(stack = stack_name, template = %template.display(), "cloudformation deploy");
        status(self.deploy_command(stack_name, template), "cloudformation deploy")
    }

    pub fn delete_stack(&self, stack_name: &str) -> Result<()> {
        info!(stack = stack_name, "cloudformation delete-stack");
        status(self.delete_command(stack_name), "cloudformation delete-stack")?;
        status(self.wait_deleted_command(stack_name), "cloudformation wait stack-delete-complete")
    }

    pub fn sync_bucket(&self, source: &Path, bucket: &str) -> Result<()> {
        info!(bucket, source = %source.display(), "seeding bucket");
        status(self.sync_command(source, bucket), "s3 sync")
    }

    pub fn empty_bucket(&self, bucket: &str) -> Result<()> {
        info!(bucket, "emptying bucket");
        status(self.empty_bucket_command(bucket), "s3 rm")
    }

    /// False on any head-bucket failure, including a bucket owned elsewhere.
    pub fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let st = self.head_bucket_command(bucket)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("spawn aws s3api head-bucket")?;
        Ok(st.success())
    }

    pub fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket)? {
            return Ok(());
        }
        info!(bucket, "creating bucket");
        status(self.make_bucket_command(bucket), "s3 mb")
    }

    /// Uploads `(zip, key)` pairs into `bucket`, creating it first if needed.
    /// Runs before the stack deploy so the functions find their code.
    pub fn publish_bundles(&self, bucket: &str, bundles: &[(PathBuf, String)]) -> Result<()> {
        self.ensure_bucket(bucket)?;
        for (file, key) in bundles {
            info!(bucket, key = key.as_str(), bundle = %file.display(), "uploading handler bundle");
            status(self.upload_command(file, bucket, key), "s3 cp")?;
        }
        Ok(())
    }

    /// Empties `bucket` when given and still present, then deletes the stack.
    /// A failed empty is logged and the delete still runs.
    pub fn destroy_stack(&self, stack_name: &str, bucket: Option<&str>) -> Result<()> {
        if let Some(bucket) = bucket {
            if !self.bucket_exists(bucket)? {
                info!(bucket, "bucket absent, nothing to empty");
            } else if let Err(e) = self.empty_bucket(bucket) {
                warn!(bucket, error = %e, "could not empty bucket, deleting stack anyway");
            }
        }
        self.delete_stack(stack_name)
    }

    pub fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        let out = self.describe_command(stack_name)
            .stderr(Stdio::inherit())
            .output()
            .context("spawn aws cloudformation describe-stacks")?;
        if !out.status.success() { anyhow::bail!("cloudformation describe-stacks failed") }
        parse_stack_outputs(&out.stdout)
    }
}

fn status(mut cmd: Command, what: &str) -> Result<()> {
    let st = cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("spawn aws {what}"))?;
    if !st.success() { anyhow::bail!("{what} failed") }
    Ok(())
}

#[derive(Deserialize)]
struct DescribeStacks {
    #[serde(rename = "Stacks", default)]
    stacks: Vec<StackDescription>,
}

#[derive(Deserialize)]
struct StackDescription {
    #[serde(rename = "Outputs", default)]
    outputs: Vec<StackOutput>,
}

#[derive(Deserialize)]
struct StackOutput {
    #[serde(rename = "OutputKey")]
    key: String,
    #[serde(rename = "OutputValue")]
    value: String,
}

/// Output key to value for the first stack in a `describe-stacks` response.
pub fn parse_stack_outputs(raw: &[u8]) -> Result<BTreeMap<String, String>> {
    let d: DescribeStacks = serde_json::from_slice(raw).context("parse describe-stacks output")?;
    let stack = d.stacks.into_iter().next().context("describe-stacks returned no stacks")?;
    Ok(stack.outputs.into_iter().map(|o| (o.key, o.value)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn deploy_passes_template_file_and_region() {
        let cli = AwsCli::with_binary("/usr/bin/aws", Some("eu-west-1"));
        let a = args(&cli.deploy_command("Stack", Path::new("out/template.json")));
        assert_eq!(&a[..4], ["cloudformation", "deploy", "--stack-name", "Stack"]);
        assert!(a.windows(2).any(|w| w == ["--template-file", "out/template.json"]));
        assert!(a.contains(&"CAPABILITY_NAMED_IAM".to_string()));
        assert!(a.windows(2).any(|w| w == ["--region", "eu-west-1"]));
    }

    #[test]
    fn sync_targets_bucket_url() {
        let cli = AwsCli::with_binary("aws", None);
        let a = args(&cli.sync_command(Path::new("./s3bucket-dist"), "vpc-endpoints-bucket-test-1"));
        assert_eq!(a, ["s3", "sync", "./s3bucket-dist", "s3://vpc-endpoints-bucket-test-1", "--delete"]);
    }

    #[test]
    fn empty_bucket_is_recursive() {
        let cli = AwsCli::with_binary("aws", None);
        let a = args(&cli.empty_bucket_command("b"));
        assert_eq!(a, ["s3", "rm", "s3://b", "--recursive"]);
    }

    #[test]
    fn head_and_make_bucket_commands() {
        let cli = AwsCli::with_binary("aws", Some("us-east-1"));
        assert_eq!(args(&cli.head_bucket_command("code")), ["s3api", "head-bucket", "--bucket", "code", "--region", "us-east-1"]);
        assert_eq!(args(&cli.make_bucket_command("code")), ["s3", "mb", "s3://code", "--region", "us-east-1"]);
    }

    #[test]
    fn upload_targets_object_url() {
        let cli = AwsCli::with_binary("aws", None);
        let a = args(&cli.upload_command(Path::new("out/read_s3.zip"), "assets-bucket", "read_s3.zip"));
        assert_eq!(a, ["s3", "cp", "out/read_s3.zip", "s3://assets-bucket/read_s3.zip"]);
    }

    /// Stand-in `aws` binary that logs its arguments and fails the calls
    /// whose first two words are listed in `failing`.
    #[cfg(unix)]
    fn fake_aws(dir: &Path, failing: &[&str]) -> (AwsCli, PathBuf) {
        use std::os::unix::fs::PermissionsExt;
        let log = dir.join("calls.log");
        let cases: String = failing.iter().map(|f| format!("  \"{f}\") exit 1 ;;\n")).collect();
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\ncase \"$1 $2\" in\n{cases}esac\nexit 0\n",
            log.display()
        );
        let bin = dir.join("aws");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        (AwsCli::with_binary(bin, None), log)
    }

    #[cfg(unix)]
    fn calls(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log).unwrap_or_default().lines().map(str::to_string).collect()
    }

    #[cfg(unix)]
    #[test]
    fn destroy_skips_emptying_a_missing_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let (cli, log) = fake_aws(dir.path(), &["s3api head-bucket"]);
        cli.destroy_stack("Stack", Some("gone")).unwrap();
        assert_eq!(calls(&log), [
            "s3api head-bucket --bucket gone",
            "cloudformation delete-stack --stack-name Stack",
            "cloudformation wait stack-delete-complete --stack-name Stack",
        ]);
    }

    #[cfg(unix)]
    #[test]
    fn destroy_deletes_stack_even_if_emptying_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (cli, log) = fake_aws(dir.path(), &["s3 rm"]);
        cli.destroy_stack("Stack", Some("b")).unwrap();
        let c = calls(&log);
        assert_eq!(c[1], "s3 rm s3://b --recursive");
        assert_eq!(c[2], "cloudformation delete-stack --stack-name Stack");
    }

    #[cfg(unix)]
    #[test]
    fn destroy_with_retained_bucket_only_deletes_stack() {
        let dir = tempfile::tempdir().unwrap();
        let (cli, log) = fake_aws(dir.path(), &[]);
        cli.destroy_stack("Stack", None).unwrap();
        assert!(calls(&log)[0].starts_with("cloudformation delete-stack"));
    }

    #[cfg(unix)]
    #[test]
    fn publish_creates_missing_bucket_before_uploading() {
        let dir = tempfile::tempdir().unwrap();
        let (cli, log) = fake_aws(dir.path(), &["s3api head-bucket"]);
        let bundles = vec![
            (PathBuf::from("out/read_s3.zip"), "read_s3.zip".to_string()),
            (PathBuf::from("out/read_secrets_manager.zip"), "read_secrets_manager.zip".to_string()),
        ];
        cli.publish_bundles("code", &bundles).unwrap();
        assert_eq!(calls(&log), [
            "s3api head-bucket --bucket code",
            "s3 mb s3://code",
            "s3 cp out/read_s3.zip s3://code/read_s3.zip",
            "s3 cp out/read_secrets_manager.zip s3://code/read_secrets_manager.zip",
        ]);
    }

    #[cfg(unix)]
    #[test]
    fn failed_upload_stops_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let (cli, log) = fake_aws(dir.path(), &["s3 cp"]);
        let bundles = vec![(PathBuf::from("a.zip"), "a.zip".to_string()), (PathBuf::from("b.zip"), "b.zip".to_string())];
        assert!(cli.publish_bundles("code", &bundles).is_err());
        assert_eq!(calls(&log).len(), 2);
    }

    #[test]
    fn parses_outputs() {
        let raw = br#"{"Stacks":[{"StackName":"S","Outputs":[
            {"OutputKey":"ReadS3ApiGatewayUrl","OutputValue":"https://abc.execute-api.us-east-1.amazonaws.com/prod/","ExportName":"readS3ApiGatewayExport"},
            {"OutputKey":"ReadSecretsManagerApiGatewayUrl","OutputValue":"https://def.execute-api.us-east-1.amazonaws.com/prod/"}
        ]}]}"#;
        let outs = parse_stack_outputs(raw).unwrap();
        assert_eq!(outs.len(), 2);
        assert!(outs["ReadS3ApiGatewayUrl"].starts_with("https://abc."));
    }

    #[test]
    fn empty_stack_list_is_an_error() {
        assert!(parse_stack_outputs(br#"{"Stacks":[]}"#).is_err());
        let outs = parse_stack_outputs(br#"{"Stacks":[{}]}"#).unwrap();
        assert!(outs.is_empty());
    }
}
