// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use anyhow::{Context, Result};
use clap::Parser;
use ndp::gateway::DEFAULT_IP_COMMAND;
use ndp::log::{init_file_logger, init_logger};
use ndp::util::{create_socket, interface_index};
use ndp::{DryRunGateway, Gateway, IpRouteGateway, Listener, RouterTable};
use slog::{info, Logger};
use socket2::Socket;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

/// Maintain the IPv6 default route from received router advertisements.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, styles = get_styles())]
pub struct Cli {
    /// Only listen on this interface. Listens on all interfaces if not set.
    #[arg(short, long, env = "NDPD_INTERFACE")]
    interface: Option<String>,

    /// Stay in the foreground instead of detaching.
    #[arg(short, long, env = "NDPD_FOREGROUND")]
    foreground: bool,

    /// Write logs to this file instead of stdout.
    #[arg(long, env = "NDPD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log default route changes without making them.
    #[arg(long, env = "NDPD_DRY_RUN")]
    dry_run: bool,

    /// Command used to add and remove the default route.
    #[arg(long, env = "NDPD_IP_COMMAND", default_value = DEFAULT_IP_COMMAND)]
    ip_command: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Opened before detaching so relative paths resolve here.
    let log_file = cli
        .log_file
        .as_ref()
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))
        })
        .transpose()?;

    // Failures up to here are reported on stderr with a non-zero exit.
    let (index, sock) = setup(&cli)?;

    // The async log drain runs a thread, which would not survive the fork.
    if !cli.foreground {
        daemonize()?;
    }

    let log = match log_file {
        Some(f) => init_file_logger(f),
        None => init_logger(),
    };

    start(&cli, index, sock, &log)
}

/// Resolve the interface and open the listening socket.
fn setup(cli: &Cli) -> Result<(Option<u32>, Socket)> {
    let index = cli
        .interface
        .as_deref()
        .map(|name| {
            interface_index(name)
                .with_context(|| format!("unknown interface {name}"))
        })
        .transpose()?;

    let sock = create_socket(index).context("create listening socket")?;
    Ok((index, sock))
}

fn start(cli: &Cli, index: Option<u32>, sock: Socket, log: &Logger) -> ! {
    info!(log, "starting ndpd";
        "interface" => cli.interface.as_deref().unwrap_or("all"),
        "if_index" => index,
        "dry_run" => cli.dry_run
    );

    let gateway: Box<dyn Gateway> = if cli.dry_run {
        Box::new(DryRunGateway::new(log.clone()))
    } else {
        Box::new(IpRouteGateway::new(cli.ip_command.clone(), log.clone()))
    };

    let listener = Listener::new(sock, index, log.clone());
    let mut table = RouterTable::new(gateway, log.clone());

    ndp::run(&listener, &mut table, log)
}

fn daemonize() -> Result<()> {
    if unsafe { libc::daemon(0, 0) } != 0 {
        return Err(io::Error::last_os_error()).context("daemonize");
    }
    Ok(())
}

fn bold(r: u8, g: u8, b: u8) -> anstyle::Style {
    let color = anstyle::Color::Rgb(anstyle::RgbColor(r, g, b));
    anstyle::Style::new().bold().fg_color(Some(color))
}

/// Oxide themed CLI ;)
pub fn get_styles() -> clap::builder::Styles {
    let yellow = bold(245, 207, 101);
    let green = bold(72, 213, 151);
    let pink = bold(232, 104, 134);
    clap::builder::Styles::styled()
        .header(yellow.underline())
        .literal(green)
        .invalid(green)
        .valid(green)
        .usage(yellow)
        .error(pink)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["ndpd"]).unwrap();
        assert_eq!(cli.interface, None);
        assert!(!cli.foreground);
        assert!(!cli.dry_run);
        assert_eq!(cli.ip_command, PathBuf::from("/sbin/ip"));
    }

    #[test]
    fn flags() {
        let cli = Cli::try_parse_from([
            "ndpd",
            "-i",
            "eth0",
            "-f",
            "--dry-run",
            "--log-file",
            "/tmp/ndpd.log",
            "--ip-command",
            "/usr/sbin/ip",
        ])
        .unwrap();
        assert_eq!(cli.interface.as_deref(), Some("eth0"));
        assert!(cli.foreground);
        assert!(cli.dry_run);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/ndpd.log")));
        assert_eq!(cli.ip_command, PathBuf::from("/usr/sbin/ip"));
    }

    #[test]
    fn setup_rejects_unknown_interface() {
        let cli = Cli::try_parse_from(["ndpd", "-i", "ndpd-missing0"]).unwrap();
        let err = setup(&cli).unwrap_err();
        assert!(
            format!("{err:#}").contains("unknown interface ndpd-missing0"),
            "{err:#}"
        );
    }
}
