use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, info_span};
use tracing_subscriber::fmt::format::FmtSpan;

use vpce_cfn::{self as cfn, AwsCli};
use vpce_policy::Policy;
use vpce_topology::{naming, Topology, TopologyConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "vpce: isolated Lambda functions behind VPC endpoints, as a CloudFormation stack")]
struct Cli {
    /// Topology config (YAML); required
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Output directory for the rendered template
    #[arg(short, long, default_value = "out", global = true)]
    out: PathBuf,

    /// Environment id, overrides `environment_id` from the config
    #[arg(long = "env", global = true)]
    environment_id: Option<String>,

    /// Allow unencrypted buckets
    #[arg(long, default_value_t = false, global = true)]
    allow_unencrypted: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build, check and write the template
    Synth,
    /// Build and check only
    Validate,
    /// Synth, upload handler bundles, deploy the stack, then seed the bucket
    Deploy {
        #[arg(long)] stack: Option<String>,
    },
    /// Empty the bucket (teardown = destroy) and delete the stack
    Destroy {
        #[arg(long)] stack: Option<String>,
    },
    /// Print the front door URLs of a deployed stack
    Outputs {
        #[arg(long)] stack: Option<String>,
    },
}

fn load(cli: &Cli) -> Result<TopologyConfig> {
    let file = cli.file.as_deref().context("--file <config.yaml> is required")?;
    let cfg = TopologyConfig::from_path(file)
        .with_context(|| format!("load {}", file.display()))?;
    Ok(match &cli.environment_id {
        Some(env) => cfg.with_environment(env.clone()),
        None => cfg,
    })
}

/// Builds the topology and runs the policy checks on the rendered template.
fn synth(cfg: &TopologyConfig, policy: &Policy) -> Result<(Topology, cfn::CfnTemplate)> {
    let topology = Topology::build(cfg)?;
    let tpl = topology.template()?;
    policy.check_template(&tpl.to_json()?)?;
    Ok((topology, tpl))
}

fn write(tpl: &cfn::CfnTemplate, out: &Path) -> Result<PathBuf> {
    let path = cfn::write_template(tpl, out)?;
    println!("{}", path.display());
    Ok(path)
}

/// Zips each handler directory into `out`, paired with its code bucket key.
fn package(cfg: &TopologyConfig, out: &Path) -> Result<Vec<(PathBuf, String)>> {
    cfg.handler_bundles()?
        .into_iter()
        .map(|b| Ok((cfn::package_dir(&b.source, &out.join(&b.key))?, b.key)))
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().json().with_span_events(FmtSpan::CLOSE).init();
    let cli = Cli::parse();
    let policy = Policy::new(cli.allow_unencrypted);
    let cfg = load(&cli)?;

    match &cli.cmd {
        Cmd::Synth => {
            let _span = info_span!("synth", environment_id = %cfg.environment_id).entered();
            let (_, tpl) = synth(&cfg, &policy)?;
            write(&tpl, &cli.out)?;
        }
        Cmd::Validate => {
            let _span = info_span!("validate", environment_id = %cfg.environment_id).entered();
            let (topology, _) = synth(&cfg, &policy)?;
            info!(resources = topology.graph.len(), "topology is valid");
        }
        Cmd::Deploy { stack } => {
            let stack_name = stack.as_deref().unwrap_or(cfg.stack_name());
            let _span = info_span!("deploy", stack = stack_name, environment_id = %cfg.environment_id).entered();
            let (topology, tpl) = synth(&cfg, &policy)?;
            let path = write(&tpl, &cli.out)?;
            let aws = AwsCli::locate(cfg.region.as_deref())?;
            let bundles = package(&cfg, &cli.out)?;
            if bundles.is_empty() {
                info!("no handlers.source_dir, expecting bundles already in the code bucket");
            } else {
                aws.publish_bundles(&cfg.code_bucket()?, &bundles)?;
            }
            aws.deploy_stack(stack_name, &path)?;
            let seed = &topology.storage.seed;
            aws.sync_bucket(&seed.source, &seed.bucket_name)?;
            info!(files = seed.files.len(), bucket = %seed.bucket_name, "content seeded");
        }
        Cmd::Destroy { stack } => {
            let stack_name = stack.as_deref().unwrap_or(cfg.stack_name());
            let _span = info_span!("destroy", stack = stack_name).entered();
            // the seed directory may be gone by now; only the bucket name is needed
            let bucket = naming::bucket_name(&cfg.storage.bucket_prefix, &cfg.environment_id)?;
            let aws = AwsCli::locate(cfg.region.as_deref())?;
            let emptied = cfg.storage.teardown.empties_contents().then_some(bucket.as_str());
            aws.destroy_stack(stack_name, emptied)?;
        }
        Cmd::Outputs { stack } => {
            let stack_name = stack.as_deref().unwrap_or(cfg.stack_name());
            let _span = info_span!("outputs", stack = stack_name).entered();
            let outputs = AwsCli::locate(cfg.region.as_deref())?.stack_outputs(stack_name)?;
            if outputs.is_empty() {
                anyhow::bail!("stack {stack_name} has no outputs");
            }
            for (key, url) in &outputs {
                println!("{key}\t{url}");
            }
        }
    }
    Ok(())
}
