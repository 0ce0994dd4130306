use colored::Colorize;
use skyform_cloud::Provider;
use skyform_cloud_kamatera::KamateraProvider;

pub async fn handle(provider: &KamateraProvider) -> anyhow::Result<()> {
    println!("{}", "Checking Kamatera credentials...".blue());

    let status = provider.check_auth().await?;
    if !status.authenticated {
        let reason = status.error.unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("authentication failed: {}", reason);
    }

    println!("{}", "✓ Authenticated".green().bold());
    if let Some(info) = status.account_info {
        println!("  {}", info);
    }
    Ok(())
}
