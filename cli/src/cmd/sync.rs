use anyhow::Result;

use drand_proto::StartSyncRequest;

pub async fn follow_chain(
    control: &str,
    beacon_id: String,
    nodes: Vec<String>,
    up_to: u64,
) -> Result<String> {
    let mut client = super::dial(control).await?;
    let mut stream = client
        .start_follow_chain(StartSyncRequest {
            chain_hash: Vec::new(),
            nodes,
            up_to,
            beacon_id,
            dry_run: false,
        })
        .await?
        .into_inner();

    while let Some(progress) = stream.message().await? {
        println!("round {}/{}", progress.current, progress.target);
    }
    Ok("follow-chain complete".to_string())
}

pub async fn check_chain(
    control: &str,
    beacon_id: String,
    nodes: Vec<String>,
    up_to: u64,
    dry_run: bool,
) -> Result<String> {
    let mut client = super::dial(control).await?;
    let mut stream = client
        .start_check_chain(StartSyncRequest {
            chain_hash: Vec::new(),
            nodes,
            up_to,
            beacon_id,
            dry_run,
        })
        .await?
        .into_inner();

    while let Some(progress) = stream.message().await? {
        if dry_run {
            println!("{} invalid rounds found", progress.target);
        } else {
            println!("checked round {}/{}", progress.current, progress.target);
        }
    }
    Ok("check-chain complete".to_string())
}
