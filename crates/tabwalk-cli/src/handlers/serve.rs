//! Serve command handler

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tabwalk::{DriverFactory, ValidationConfig, ValidationRunner};

use crate::error::{CliError, CliResult};
use crate::server::{self, AppState};
use crate::ServeArgs;

/// Serve the control panel until the process exits
pub async fn execute_serve<F: DriverFactory>(
    config: ValidationConfig,
    args: &ServeArgs,
    log_file: PathBuf,
    factory: F,
) -> CliResult<()> {
    let addr = parse_addr(&args.host, args.port)?;
    println!("{}", banner(&config, addr));
    let state = Arc::new(AppState::new(ValidationRunner::new(config, factory), log_file));
    server::serve(state, addr).await
}

/// Resolve `--host`/`--port`; `localhost` maps to the IPv4 loopback
pub fn parse_addr(host: &str, port: u16) -> CliResult<SocketAddr> {
    let ip = if host.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse::<IpAddr>()
            .map_err(|_| CliError::invalid_argument(format!("Invalid host address: {host}")))?
    };
    Ok(SocketAddr::new(ip, port))
}

/// Startup banner
#[must_use]
pub fn banner(config: &ValidationConfig, addr: SocketAddr) -> String {
    let environments: Vec<&str> = config.environments.keys().map(String::as_str).collect();
    [
        "╔══════════════════════════════════════════════════════════════╗".to_string(),
        "║                  Tabwalk Control Panel                       ║".to_string(),
        "╠══════════════════════════════════════════════════════════════╣".to_string(),
        format!("║  Project:      {:<46}║", config.project_name),
        format!("║  HTTP:         http://{:<39}║", addr.to_string()),
        format!("║  Environments: {:<46}║", environments.join(", ")),
        format!("║  Tabs:         {:<46}║", config.tabs.len()),
        "╠══════════════════════════════════════════════════════════════╣".to_string(),
        "║  Press Ctrl+C to stop                                        ║".to_string(),
        "╚══════════════════════════════════════════════════════════════╝".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tabwalk::{Locator, TabSpec};

    #[test]
    fn test_parse_addr() {
        let addr = parse_addr("127.0.0.1", 5000).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:5000");
        let addr = parse_addr("localhost", 8080).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
        let addr = parse_addr("0.0.0.0", 80).unwrap();
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn test_parse_addr_rejects_garbage() {
        let err = parse_addr("not a host", 5000).unwrap_err();
        assert!(err.to_string().contains("Invalid host address"));
    }

    #[test]
    fn test_banner_lists_environments() {
        let config = ValidationConfig::new("Acme CRM")
            .with_environment("staging", "https://staging.example.com")
            .with_environment("prod", "https://crm.example.com")
            .with_tab(TabSpec::new("Home", Locator::id("home"), Locator::id("home_body")));
        let text = banner(&config, parse_addr("127.0.0.1", 5000).unwrap());
        assert!(text.contains("Acme CRM"));
        assert!(text.contains("http://127.0.0.1:5000"));
        assert!(text.contains("prod, staging"));
    }
}
