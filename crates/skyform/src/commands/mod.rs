pub mod check;
pub mod datacenters;
pub mod disk_plan;
pub mod images;
pub mod server;
pub mod wait;

use colored::Colorize;
use skyform_cloud_kamatera::CommandRecord;

/// Print the outcome of a finished command
pub(crate) fn print_command(record: &CommandRecord) {
    println!("{}", "✓ Command complete".green().bold());
    if let Some(log) = record.log() {
        for line in log.lines() {
            println!("  {}", line.dimmed());
        }
    }
}
