use anyhow::Context;
use colored::Colorize;
use skyform_cloud_kamatera::dto::{ServerInfoRequest, ServerRecord};
use skyform_cloud_kamatera::server::{change_server_power, parse_cpu, server_info};
use skyform_cloud_kamatera::{KamateraProvider, PowerOperation};

pub async fn show(
    provider: &KamateraProvider,
    name: Option<String>,
    id: Option<String>,
) -> anyhow::Result<()> {
    let request = match (id, name) {
        (Some(id), _) => ServerInfoRequest::by_id(id),
        (None, Some(name)) => ServerInfoRequest::by_name(name),
        (None, None) => anyhow::bail!("either a server name or --id is required"),
    };

    let server = server_info(provider.api(), &request)
        .await
        .context("failed to read server")?;
    print_server(&server)
}

fn print_server(server: &ServerRecord) -> anyhow::Result<()> {
    let (cpu_type, cpu_cores) = parse_cpu(&server.cpu)?;
    let disks: Vec<String> = server.disk_sizes.iter().map(|size| size.to_string()).collect();

    println!("{}", server.name.cyan().bold());
    println!("  id:         {}", server.id);
    println!("  datacenter: {}", server.datacenter);
    println!("  power:      {}", power_label(&server.power));
    println!("  cpu:        {} x {}", cpu_cores, cpu_type);
    println!("  ram:        {} MB", server.ram);
    println!("  disks:      [{}] GB", disks.join(", "));
    println!("  billing:    {}", server.billing);
    if !server.traffic.is_empty() {
        println!("  traffic:    {}", server.traffic);
    }
    println!("  backup:     {}", server.backup);
    println!("  managed:    {}", server.managed);

    if !server.networks.is_empty() {
        println!("  networks:");
        for network in &server.networks {
            let scope = if network.is_public() { "public" } else { "private" };
            println!(
                "    - {} ({}): {}",
                network.network,
                scope.dimmed(),
                network.ips.join(", ")
            );
        }
    }

    if !server.price_monthly_on.is_empty() || !server.price_hourly_on.is_empty() {
        println!(
            "  price:      {} monthly, {} hourly on, {} hourly off",
            server.price_monthly_on, server.price_hourly_on, server.price_hourly_off
        );
    }
    Ok(())
}

fn power_label(power: &str) -> colored::ColoredString {
    match power {
        "on" => power.green(),
        "off" => power.red(),
        _ => power.yellow(),
    }
}

pub async fn power(
    provider: &KamateraProvider,
    id: &str,
    operation: PowerOperation,
) -> anyhow::Result<()> {
    println!("Server {}: {}", id.cyan(), operation.to_string().blue());

    let record = change_server_power(&provider.waiter(), id, operation)
        .await
        .with_context(|| format!("{} failed for server {}", operation, id))?;

    super::print_command(&record);
    Ok(())
}
