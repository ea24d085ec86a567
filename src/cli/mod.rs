//! Command-line interface definitions and argument handling.

pub mod control;
pub mod info;
pub mod server;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::amt::{CommandCode, Optionset};
use crate::config;
use crate::error::{ConfigError, Result};

/// amtctl - Out-of-band management for Intel AMT / DASH hosts
#[derive(Parser)]
#[command(name = "amtctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose protocol logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON instead of aligned text (info only)
    #[arg(long, global = true)]
    pub json: bool,

    /// Per-request timeout in seconds
    #[arg(short = 'w', long, global = true, default_value_t = 10)]
    pub wait: u64,

    /// Pause between hosts in milliseconds for sequential commands
    #[arg(short = 'd', long, global = true, default_value_t = 1500)]
    pub delay: u64,

    /// Use TLS on port 16993 instead of plain HTTP on 16992
    #[arg(short = 't', long, global = true)]
    pub tls: bool,

    /// Skip TLS certificate verification
    #[arg(short = 'n', long = "no-verify", global = true)]
    pub no_verify: bool,

    /// AMT username
    #[arg(
        short = 'u',
        long,
        global = true,
        env = "AMT_USER",
        default_value = "admin"
    )]
    pub username: String,

    /// AMT password
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "AMT_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,

    /// Read the AMT password from a file (overrides --password)
    #[arg(long, global = true, value_name = "FILE")]
    pub password_file: Option<String>,

    /// CA certificate (PEM) used to verify the AMT TLS certificate
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub cacert_file: Option<String>,
}

impl Cli {
    pub fn delay_duration(&self) -> Duration {
        Duration::from_millis(self.delay)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query power state and probe auxiliary ports
    Info {
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Power and boot-order control
    #[command(subcommand)]
    Control(ControlCommands),

    /// Toggle AMT management features
    #[command(subcommand)]
    Modify(ModifyCommands),

    /// Run the monitoring scanner and job scheduler
    Server {
        /// SQLite database file
        #[arg(long, default_value = "amtctl.db")]
        db: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ControlCommands {
    /// Power up immediately
    Powerup {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Power down immediately (hard off)
    Powerdown {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Hard reset
    Reset {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Graceful reboot via the OS
    Reboot {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Graceful shutdown via the OS
    Shutdown {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Set one-time PXE boot and reset
    Pxeboot {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Set one-time HDD boot and reset
    Hddboot {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

impl ControlCommands {
    pub fn parts(&self) -> (CommandCode, &[String]) {
        match self {
            ControlCommands::Powerup { hosts } => (CommandCode::Up, hosts),
            ControlCommands::Powerdown { hosts } => (CommandCode::Down, hosts),
            ControlCommands::Reset { hosts } => (CommandCode::Reset, hosts),
            ControlCommands::Reboot { hosts } => (CommandCode::Reboot, hosts),
            ControlCommands::Shutdown { hosts } => (CommandCode::Shutdown, hosts),
            ControlCommands::Pxeboot { hosts } => (CommandCode::BootcfgPxe, hosts),
            ControlCommands::Hddboot { hosts } => (CommandCode::BootcfgHdd, hosts),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    Enable,
    Disable,
}

#[derive(Subcommand)]
pub enum ModifyCommands {
    /// AMT web UI on the management port
    Webui {
        #[arg(value_enum)]
        state: Toggle,
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// ICMP ping response
    Ping {
        #[arg(value_enum)]
        state: Toggle,
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Serial-over-LAN and IDE redirection
    Sol {
        #[arg(value_enum)]
        state: Toggle,
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

impl ModifyCommands {
    pub fn parts(&self) -> (CommandCode, &[String]) {
        match self {
            ModifyCommands::Webui { state, hosts } => (
                match state {
                    Toggle::Enable => CommandCode::WebEnable,
                    Toggle::Disable => CommandCode::WebDisable,
                },
                hosts,
            ),
            ModifyCommands::Ping { state, hosts } => (
                match state {
                    Toggle::Enable => CommandCode::PingEnable,
                    Toggle::Disable => CommandCode::PingDisable,
                },
                hosts,
            ),
            ModifyCommands::Sol { state, hosts } => (
                match state {
                    Toggle::Enable => CommandCode::SolEnable,
                    Toggle::Disable => CommandCode::SolDisable,
                },
                hosts,
            ),
        }
    }
}

/// Assemble connection options from the command line.
///
/// File-backed material is read and validated here so a bad path or
/// unparsable certificate fails once at startup rather than per host.
pub fn build_optionset(cli: &Cli) -> Result<Optionset> {
    let mut set = Optionset {
        use_tls: cli.tls,
        skip_cert_check: cli.no_verify,
        timeout_secs: cli.wait,
        username: cli.username.clone(),
        password: cli.password.clone(),
        scan_22: true,
        scan_3389: true,
        ..Optionset::default()
    };

    if let Some(path) = &cli.password_file {
        set.password = config::read_password_file(path)?;
    }

    if cli.tls && !cli.no_verify {
        if let Some(path) = &cli.cacert_file {
            let pem = config::read_ca_file(path)?;
            reqwest::Certificate::from_pem(&pem)
                .map_err(|err| ConfigError::InvalidCaCert(err.to_string()))?;
            set.ca_pem = Some(pem);
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_structure_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_info_requires_hosts() {
        assert!(Cli::try_parse_from(["amtctl", "info"]).is_err());
    }

    #[test]
    fn test_info_collects_hosts() {
        let cli = parse(&["amtctl", "info", "labpc-01", "labpc-02"]);
        match cli.command {
            Commands::Info { hosts } => assert_eq!(hosts, vec!["labpc-01", "labpc-02"]),
            _ => panic!("expected info"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["amtctl", "info", "h"]);
        assert_eq!(cli.wait, 10);
        assert_eq!(cli.delay, 1500);
        assert!(!cli.tls);
        assert!(!cli.no_verify);
    }

    #[test]
    fn test_control_maps_to_command_codes() {
        let cli = parse(&["amtctl", "control", "powerup", "h1"]);
        match cli.command {
            Commands::Control(control) => {
                let (cmd, hosts) = control.parts();
                assert_eq!(cmd, CommandCode::Up);
                assert_eq!(hosts, ["h1"]);
            }
            _ => panic!("expected control"),
        }
    }

    #[test]
    fn test_modify_toggle_maps_to_command_codes() {
        let cli = parse(&["amtctl", "modify", "sol", "disable", "h1"]);
        match cli.command {
            Commands::Modify(modify) => {
                let (cmd, _) = modify.parts();
                assert_eq!(cmd, CommandCode::SolDisable);
            }
            _ => panic!("expected modify"),
        }
    }

    #[test]
    fn test_password_file_overrides_flag() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"filepass\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&[
            "amtctl",
            "info",
            "h",
            "--password",
            "flagpass",
            "--password-file",
            &path,
        ]);
        let set = build_optionset(&cli).unwrap();
        assert_eq!(set.password, "filepass");
    }

    #[test]
    fn test_ca_ignored_without_tls() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["amtctl", "info", "h", "--cacert-file", &path]);
        let set = build_optionset(&cli).unwrap();
        assert!(set.ca_pem.is_none());
    }

    #[test]
    fn test_unparsable_ca_is_fatal_with_tls() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["amtctl", "info", "h", "--tls", "--cacert-file", &path]);
        assert!(build_optionset(&cli).is_err());
    }
}
