use anyhow::Context;
use colored::Colorize;
use skyform_cloud_kamatera::KamateraProvider;
use skyform_cloud_kamatera::image::{image_table, list_images};

pub async fn handle(provider: &KamateraProvider, datacenter: &str) -> anyhow::Result<()> {
    let images = list_images(provider.api(), datacenter)
        .await
        .with_context(|| format!("failed to list images of datacenter {}", datacenter))?;

    println!("Datacenter: {}", datacenter.cyan());
    if images.is_empty() {
        println!("{}", "No public images".dimmed());
        return Ok(());
    }

    println!("{}", image_table(&images));
    println!();
    println!("{}", "Private images are not listed".dimmed());
    Ok(())
}
