//! `netharden` binary: audits one device using settings from the
//! environment and prints a report to stdout.
//!
//! Stage failures are printed and never change the exit status.

use log::{debug, error};

use netharden::{AuditConfig, Auditor, SshConnector};

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AuditConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("Invalid configuration: {e}");
            return;
        }
    };

    let auditor = match Auditor::new(config, SshConnector) {
        Ok(auditor) => auditor,
        Err(e) => {
            println!("Invalid configuration: {e}");
            return;
        }
    };

    match auditor.run(&mut std::io::stdout()).await {
        Ok(report) => debug!("stage failures: {:?}", report.failures()),
        Err(e) => error!("failed to write report: {}", e),
    }
}
