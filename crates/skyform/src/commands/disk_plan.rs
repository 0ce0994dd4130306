use anyhow::Context;
use colored::Colorize;
use serde_json::Value;
use skyform_cloud_kamatera::compute_disk_diff;
use skyform_cloud_kamatera::disk::disk_change_requests;

pub fn handle(prior: &str, desired: &str, server_id: &str) -> anyhow::Result<()> {
    let prior: Value = serde_json::from_str(prior).context("--prior is not valid JSON")?;
    let desired: Value = serde_json::from_str(desired).context("--desired is not valid JSON")?;

    let ops = compute_disk_diff(&prior, &desired)?;
    println!("{}", ops.to_string().bold());

    for request in disk_change_requests(server_id, &ops) {
        println!("  POST server/disk {}", serde_json::to_string(&request)?);
    }
    Ok(())
}
