//! EC2-backed compute gateway.

use aws_config::SdkConfig;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{self as sdk, Filter};
use tracing::debug;

use reclaim_core::{
    BlockDeviceMapping, ComputeGateway, EbsReference, GatewayError, GatewayFuture, Instance,
    InstanceId, InstanceLifecycle, InstancePage, InstanceQuery, Volume, VolumeState,
};

/// Error code EC2 returns for a volume that does not exist.
const VOLUME_NOT_FOUND: &str = "InvalidVolume.NotFound";

pub struct Ec2Compute {
    client: Client,
}

impl Ec2Compute {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn list(&self, query: &InstanceQuery) -> Result<InstancePage, GatewayError> {
        let resp = self
            .client
            .describe_instances()
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values(query.state.as_str())
                    .build(),
            )
            .max_results(query.page_size)
            .set_next_token(query.next_token.clone())
            .send()
            .await
            .map_err(|e| service_error("DescribeInstances", e))?;

        let instances = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(instance_from_sdk)
            .collect();

        Ok(InstancePage {
            instances,
            next_token: resp.next_token().map(str::to_owned),
        })
    }

    async fn terminate(&self, instance_ids: &[InstanceId]) -> Result<(), GatewayError> {
        let resp = self
            .client
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(|e| service_error("TerminateInstances", e))?;
        debug!(
            changes = resp.terminating_instances().len(),
            "terminate accepted"
        );
        Ok(())
    }

    async fn describe(&self, volume_id: &str) -> Result<Volume, GatewayError> {
        let resp = self
            .client
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
            .map_err(|e| volume_error("DescribeVolumes", volume_id, e))?;

        resp.volumes()
            .first()
            .map(|v| volume_from_sdk(volume_id, v))
            .ok_or_else(|| GatewayError::not_found("volume", volume_id))
    }

    async fn detach(&self, volume_id: &str, force: bool) -> Result<(), GatewayError> {
        self.client
            .detach_volume()
            .volume_id(volume_id)
            .force(force)
            .send()
            .await
            .map_err(|e| volume_error("DetachVolume", volume_id, e))?;
        Ok(())
    }

    async fn delete(&self, volume_id: &str) -> Result<(), GatewayError> {
        self.client
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .map_err(|e| volume_error("DeleteVolume", volume_id, e))?;
        Ok(())
    }
}

impl ComputeGateway for Ec2Compute {
    fn list_instances<'a>(&'a self, query: &'a InstanceQuery) -> GatewayFuture<'a, InstancePage> {
        Box::pin(self.list(query))
    }

    fn terminate_instances<'a>(&'a self, instance_ids: &'a [InstanceId]) -> GatewayFuture<'a, ()> {
        Box::pin(self.terminate(instance_ids))
    }

    fn describe_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, Volume> {
        Box::pin(self.describe(volume_id))
    }

    fn detach_volume<'a>(&'a self, volume_id: &'a str, force: bool) -> GatewayFuture<'a, ()> {
        Box::pin(self.detach(volume_id, force))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(self.delete(volume_id))
    }
}

/// Convert an SDK instance. Instances without an identifier are dropped.
pub(crate) fn instance_from_sdk(instance: &sdk::Instance) -> Option<Instance> {
    let id = instance.instance_id()?.to_string();
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|name| InstanceLifecycle::from_api(name.as_str()))
        .unwrap_or(InstanceLifecycle::Unknown);
    let block_device_mappings = instance
        .block_device_mappings()
        .iter()
        .map(|m| BlockDeviceMapping {
            device_name: m.device_name().map(str::to_owned),
            ebs: m.ebs().map(|ebs| EbsReference {
                volume_id: ebs.volume_id().map(str::to_owned),
            }),
        })
        .collect();

    Some(Instance {
        id,
        state,
        block_device_mappings,
    })
}

pub(crate) fn volume_from_sdk(requested_id: &str, volume: &sdk::Volume) -> Volume {
    Volume {
        id: volume.volume_id().unwrap_or(requested_id).to_string(),
        state: volume
            .state()
            .map(|s| VolumeState::from_api(s.as_str()))
            .unwrap_or(VolumeState::Unknown),
    }
}

fn service_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    GatewayError::Service {
        operation,
        code: err.code().map(str::to_owned),
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn volume_error<E, R>(operation: &'static str, volume_id: &str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if err.code() == Some(VOLUME_NOT_FOUND) {
        return GatewayError::not_found("volume", volume_id);
    }
    service_error(operation, err)
}
