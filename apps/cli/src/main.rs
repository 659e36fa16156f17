use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use diskweave_core::device::class;
use diskweave_core::DiskweaveConfig;
use serde::Serialize;
use serde_json::json;

mod logging;

/// Windows storage topology, partition layouts and reparse points
#[derive(Parser)]
#[command(name = "diskweave", version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Indent JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Physical drives joined with their drive letters and volumes
    Drives {
        /// Skip volume GUID paths
        #[arg(long)]
        no_volumes: bool,
    },
    /// Present devices exposing an interface class
    Devices {
        /// Class name (disk, cdrom, volume, ...) or interface GUID
        #[arg(default_value = "disk")]
        class: String,
        /// Remote machine to enumerate
        #[arg(long)]
        host: Option<String>,
        /// Only report paths and instance ids
        #[arg(long)]
        no_properties: bool,
    },
    /// Partition table of \\.\PhysicalDriveN
    Layout { device_number: u32 },
    /// Junctions and symbolic links
    Reparse {
        #[command(subcommand)]
        action: ReparseCommand,
    },
    /// Turn NTFS compression on or off for a file or directory
    Compress {
        path: String,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
enum ReparseCommand {
    Show {
        path: String,
    },
    /// Make a directory a junction to an absolute target
    Junction {
        path: String,
        target: String,
    },
    Symlink {
        path: String,
        target: String,
        /// Create a directory link
        #[arg(long)]
        dir: bool,
    },
    Delete {
        path: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    logging::init(&config.log.level, cli.verbose);

    match cli.command {
        Command::Drives { no_volumes } => {
            if no_volumes {
                config.topology.include_volumes = false;
            }
            let snapshot = diskweave_host_windows::build_topology(&config)
                .context("building storage topology")?;
            print_json(&snapshot, cli.pretty)
        }
        Command::Devices {
            class: class_name,
            host,
            no_properties,
        } => {
            let guid = class::from_name(&class_name)
                .ok_or_else(|| anyhow!("unknown device class: {}", class_name))?;
            if host.is_some() {
                config.enumeration.host = host;
            }
            if no_properties {
                config.enumeration.include_properties = false;
            }
            config.validate()?;
            let devices = diskweave_host_windows::list_devices(&config, guid)
                .with_context(|| format!("enumerating {} devices", class_name))?;
            print_json(&devices, cli.pretty)
        }
        Command::Layout { device_number } => {
            let layout = diskweave_host_windows::drive_layout(&config, device_number)
                .with_context(|| format!("reading layout of PhysicalDrive{}", device_number))?;
            print_json(&layout, cli.pretty)
        }
        Command::Reparse { action } => run_reparse(&config, action, cli.pretty),
        Command::Compress { path, off } => {
            diskweave_host_windows::set_compression(&path, !off)
                .with_context(|| format!("setting compression on {}", path))?;
            print_json(&json!({ "path": path, "compressed": !off }), cli.pretty)
        }
    }
}

fn run_reparse(config: &DiskweaveConfig, action: ReparseCommand, pretty: bool) -> Result<()> {
    match action {
        ReparseCommand::Show { path } => {
            let target = diskweave_host_windows::read_reparse_point(config, &path)
                .with_context(|| format!("reading reparse point of {}", path))?;
            let resolved = target.as_ref().map(|t| t.target_path());
            print_json(
                &json!({ "path": path, "reparse": target, "target": resolved }),
                pretty,
            )
        }
        ReparseCommand::Junction { path, target } => {
            diskweave_host_windows::create_junction(&path, &target)
                .with_context(|| format!("creating junction {} -> {}", path, target))?;
            print_json(&json!({ "path": path, "target": target }), pretty)
        }
        ReparseCommand::Symlink { path, target, dir } => {
            diskweave_host_windows::create_symbolic_link(&path, &target, dir)
                .with_context(|| format!("creating symbolic link {} -> {}", path, target))?;
            print_json(
                &json!({ "path": path, "target": target, "directory": dir }),
                pretty,
            )
        }
        ReparseCommand::Delete { path } => {
            let kind = diskweave_host_windows::delete_reparse_point(config, &path)
                .with_context(|| format!("deleting reparse point of {}", path))?;
            print_json(&json!({ "path": path, "deleted": kind }), pretty)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<DiskweaveConfig> {
    match path {
        Some(path) => DiskweaveConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(DiskweaveConfig::default()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reparse_and_global_flags() {
        let cli = Cli::try_parse_from([
            "diskweave",
            "reparse",
            "symlink",
            r"C:\links\logs",
            r"..\logs",
            "--dir",
            "--pretty",
            "-vv",
        ])
        .unwrap();
        assert!(cli.pretty);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Reparse {
                action: ReparseCommand::Symlink { dir: true, .. }
            }
        ));
    }

    #[test]
    fn devices_default_to_disk_class() {
        let cli = Cli::try_parse_from(["diskweave", "devices"]).unwrap();
        match cli.command {
            Command::Devices { class: name, .. } => {
                assert_eq!(class::from_name(&name), Some(class::DISK));
            }
            _ => panic!("expected devices command"),
        }
    }

    #[test]
    fn missing_config_file_is_reported() {
        let path = PathBuf::from("does-not-exist.json");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("does-not-exist.json"));
    }
}
