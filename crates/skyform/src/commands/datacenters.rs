use anyhow::Context;
use colored::Colorize;
use skyform_cloud_kamatera::KamateraProvider;
use skyform_cloud_kamatera::datacenter::{datacenter_table, list_datacenters};

pub async fn handle(provider: &KamateraProvider) -> anyhow::Result<()> {
    let datacenters = list_datacenters(provider.api())
        .await
        .context("failed to list datacenters")?;

    if datacenters.is_empty() {
        println!("{}", "No datacenters available".dimmed());
        return Ok(());
    }

    println!("{}", datacenter_table(&datacenters));
    Ok(())
}
