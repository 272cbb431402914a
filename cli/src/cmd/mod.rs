pub mod control;
pub mod sync;

use anyhow::Result;
use tonic::transport::Channel;

use drand_proto::control_client::ControlClient;

pub async fn dial(control: &str) -> Result<ControlClient<Channel>> {
    Ok(ControlClient::connect(control.to_string()).await?)
}
