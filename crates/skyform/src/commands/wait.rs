use colored::Colorize;
use skyform_cloud_kamatera::KamateraProvider;

pub async fn handle(provider: &KamateraProvider, command_id: &str) -> anyhow::Result<()> {
    println!("Waiting for command {}...", command_id.cyan());

    let record = provider.waiter().wait(command_id).await?;

    super::print_command(&record);
    Ok(())
}
