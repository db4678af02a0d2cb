use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use vpce_cfn::intrinsic::{get_att, join};
use vpce_core::{DeletionPolicy, Resource, ResourceId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub id: ResourceId,
    pub bucket_name: String,
    pub deletion: DeletionPolicy,
    #[serde(default = "default_true")]
    pub encrypted: bool,
}

fn default_true() -> bool { true }

impl Bucket {
    /// ARN of the bucket itself (for `s3:ListBucket`).
    pub fn arn(&self) -> Json { get_att(&self.id, "Arn") }

    /// ARN pattern of the objects inside this bucket only (for `s3:GetObject`).
    pub fn objects_arn(&self) -> Json { join("", vec![self.arn(), json!("/*")]) }
}

impl Resource for Bucket {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::S3::Bucket" }
    fn properties(&self) -> Json {
        let mut body = json!({
            "BucketName": self.bucket_name,
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
        });
        if self.encrypted {
            body["BucketEncryption"] = json!({ "ServerSideEncryptionConfiguration": [
                { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
            ]});
        }
        body
    }
    fn deletion_policy(&self) -> Option<DeletionPolicy> { Some(self.deletion) }
}
