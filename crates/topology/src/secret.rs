//! Secret path: generated secret, interface attachment, reader function,
//! grant and front door.

use std::collections::BTreeSet;
use tracing::info;
use vpce_aws::{AwsService, Secret, Statement};
use vpce_core::{Graph, ResourceId};

use crate::config::SecretConfig;
use crate::error::Result;
use crate::front_door::{add_front_door, FrontDoor};
use crate::function::{add_function, add_grant, FunctionHandle};
use crate::network::Network;

pub const SECRET_ID: &str = "LambdaVpcSecret";
pub const FUNCTION_ID: &str = "ReadSecretsManagerLambda";
pub const FRONT_DOOR_ID: &str = "ReadSecretsManagerApiGateway";

#[derive(Debug, Clone)]
pub struct SecretPath {
    pub secret: ResourceId,
    pub secret_name: String,
    pub attachment: ResourceId,
    pub function: FunctionHandle,
    pub grant: ResourceId,
    pub front_door: FrontDoor,
}

impl SecretPath {
    /// The secret value is generated by the store; only its name reaches the
    /// function's environment.
    pub fn build(graph: &mut Graph, network: &Network, cfg: &SecretConfig, code_bucket: &str) -> Result<Self> {
        let secret = Secret {
            id: ResourceId::new(SECRET_ID)?,
            name: cfg.name.clone(),
            template: cfg.template.clone(),
            exclude_characters: cfg.exclude_characters.clone(),
            password_length: cfg.password_length,
        };
        let secret_arn = secret.arn();
        let secret_id = graph.add(secret)?;

        let (sg, endpoint) = network.interface_attachment(AwsService::SecretsManager)?;
        graph.add(sg)?;
        let attachment = graph.add(endpoint)?;

        let function = add_function(
            graph,
            network,
            ResourceId::new(FUNCTION_ID)?,
            &cfg.function,
            code_bucket,
            &cfg.name,
            BTreeSet::from([attachment.clone(), secret_id.clone()]),
        )?;
        let grant = add_grant(graph, &function, "SecretPolicy", vec![Statement {
            actions: vec!["secretsmanager:GetSecretValue".to_string()],
            resources: vec![secret_arn],
        }])?;
        let front_door = add_front_door(graph, ResourceId::new(FRONT_DOOR_ID)?, &cfg.api_name, &function, &cfg.export_name)?;

        info!(secret = %cfg.name, function = %function.id, "secret path built");
        Ok(Self {
            secret: secret_id,
            secret_name: cfg.name.clone(),
            attachment,
            function,
            grant,
            front_door,
        })
    }
}
