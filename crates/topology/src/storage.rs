//! Storage path: bucket, gateway attachment, reader function, grant and
//! front door, plus the content seed synced once the stack is up.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vpce_aws::{AwsService, Bucket, Statement};
use vpce_core::{Graph, ResourceId};

use crate::config::{StorageConfig, Teardown};
use crate::error::{Result, TopologyError};
use crate::front_door::{add_front_door, FrontDoor};
use crate::function::{add_function, add_grant, FunctionHandle};
use crate::naming;
use crate::network::Network;

pub const BUCKET_ID: &str = "ContentBucket";
pub const FUNCTION_ID: &str = "ReadS3Lambda";
pub const FRONT_DOOR_ID: &str = "ReadS3ApiGateway";

/// Static files copied into the bucket after deployment. Not a template
/// resource: the bucket must exist before anything can be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSeed {
    pub source: PathBuf,
    pub bucket_name: String,
    /// Paths relative to `source`, sorted.
    pub files: Vec<PathBuf>,
}

impl ContentSeed {
    pub fn scan(source: &Path, bucket_name: String) -> Result<Self> {
        if !source.is_dir() {
            return Err(TopologyError::missing_input(format!(
                "content seed directory {} does not exist", source.display()
            )));
        }
        let files = vpce_cfn::list_files(source)
            .map_err(|e| TopologyError::Io { path: source.to_path_buf(), source: e })?;
        Ok(Self { source: source.to_path_buf(), bucket_name, files })
    }
}

#[derive(Debug, Clone)]
pub struct StoragePath {
    pub bucket: ResourceId,
    pub bucket_name: String,
    pub teardown: Teardown,
    pub seed: ContentSeed,
    pub attachment: ResourceId,
    pub function: FunctionHandle,
    pub grant: ResourceId,
    pub front_door: FrontDoor,
}

impl StoragePath {
    /// Order: bucket, attachment, function, grant, front door. Each step only
    /// succeeds if the ones before it are already in the graph.
    pub fn build(
        graph: &mut Graph,
        network: &Network,
        cfg: &StorageConfig,
        environment_id: &str,
        code_bucket: &str,
    ) -> Result<Self> {
        let bucket_name = naming::bucket_name(&cfg.bucket_prefix, environment_id)?;
        let bucket_id = ResourceId::new(BUCKET_ID)?;
        let seed = ContentSeed::scan(&cfg.content_seed, bucket_name.clone())?;

        let bucket = Bucket {
            id: bucket_id,
            bucket_name: bucket_name.clone(),
            deletion: cfg.teardown.deletion_policy(),
            encrypted: true,
        };
        let (bucket_arn, objects_arn) = (bucket.arn(), bucket.objects_arn());
        let bucket_id = graph.add(bucket)?;
        let attachment = graph.add(network.gateway_attachment(AwsService::S3)?)?;

        let function = add_function(
            graph,
            network,
            ResourceId::new(FUNCTION_ID)?,
            &cfg.function,
            code_bucket,
            &bucket_name,
            BTreeSet::from([attachment.clone(), bucket_id.clone()]),
        )?;
        let grant = add_grant(graph, &function, "BucketsPolicy", vec![
            Statement { actions: vec!["s3:ListBucket".to_string()], resources: vec![bucket_arn] },
            Statement { actions: vec!["s3:GetObject".to_string()], resources: vec![objects_arn] },
        ])?;
        let front_door = add_front_door(graph, ResourceId::new(FRONT_DOOR_ID)?, &cfg.api_name, &function, &cfg.export_name)?;

        info!(bucket = %bucket_name, files = seed.files.len(), teardown = ?cfg.teardown, "storage path built");
        debug!(grant = %grant, bucket = %bucket_id, "bucket read grant");
        Ok(Self {
            bucket: bucket_id,
            bucket_name,
            teardown: cfg.teardown,
            seed,
            attachment,
            function,
            grant,
            front_door,
        })
    }
}
