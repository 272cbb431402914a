use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use drand_proto::{BackupRequest, BeaconIdRequest, Empty, RemoteStatusRequest};

use crate::print::{print_with_format, Format, Print};

#[derive(Serialize)]
pub struct BeaconIds {
    pub ids: Vec<String>,
}

impl Print for BeaconIds {
    fn pretty(&self) -> Result<String> {
        if self.ids.is_empty() {
            Ok("No beacon loaded".to_string())
        } else {
            Ok(self.ids.join("\n"))
        }
    }

    fn json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.ids)?)
    }
}

#[derive(Serialize)]
pub struct Schemes {
    pub ids: Vec<String>,
}

impl Print for Schemes {
    fn pretty(&self) -> Result<String> {
        Ok(self.ids.join("\n"))
    }

    fn json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.ids)?)
    }
}

#[derive(Serialize)]
pub struct RemoteStatuses {
    pub statuses: std::collections::HashMap<String, bool>,
}

impl Print for RemoteStatuses {
    fn pretty(&self) -> Result<String> {
        let mut lines: Vec<String> = self
            .statuses
            .iter()
            .map(|(address, up)| {
                let label = if *up { "up".green() } else { "down".red() };
                format!("{address}: {label}")
            })
            .collect();
        lines.sort();
        Ok(lines.join("\n"))
    }

    fn json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.statuses)?)
    }
}

pub async fn shutdown(control: &str, beacon_id: String) -> Result<String> {
    let mut client = super::dial(control).await?;
    client.shutdown(BeaconIdRequest { beacon_id }).await?;
    Ok("shutdown requested".to_string())
}

pub async fn load_beacon(control: &str, beacon_id: String) -> Result<String> {
    let mut client = super::dial(control).await?;
    client.load_beacon(BeaconIdRequest { beacon_id: beacon_id.clone() }).await?;
    Ok(format!("loaded beacon {beacon_id}"))
}

pub async fn backup_database(control: &str, beacon_id: String, output_file: String) -> Result<String> {
    let mut client = super::dial(control).await?;
    client
        .backup_database(BackupRequest {
            metadata: Some(drand_proto::Metadata {
                beacon_id,
                chain_hash: Vec::new(),
                node_version: String::new(),
            }),
            output_file: output_file.clone(),
        })
        .await?;
    Ok(format!("backed up to {output_file}"))
}

pub async fn list_beacon_ids(control: &str, format: Format) -> Result<String> {
    let mut client = super::dial(control).await?;
    let response = client.list_beacon_ids(Empty { metadata: None }).await?.into_inner();
    print_with_format(BeaconIds { ids: response.ids }, format)
}

pub async fn list_schemes(control: &str, format: Format) -> Result<String> {
    let mut client = super::dial(control).await?;
    let response = client.list_schemes(Empty { metadata: None }).await?.into_inner();
    print_with_format(Schemes { ids: response.ids }, format)
}

pub async fn remote_status(control: &str, addresses: Vec<String>, format: Format) -> Result<String> {
    let mut client = super::dial(control).await?;
    let response = client
        .remote_status(RemoteStatusRequest {
            addresses,
            metadata: None,
        })
        .await?
        .into_inner();
    print_with_format(RemoteStatuses { statuses: response.statuses }, format)
}
