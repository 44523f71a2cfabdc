//! Command handlers for the Micropad CLI

use std::path::Path;
use std::time::Duration;

use micropad_core::{CommandAck, Profile, SessionEvent, StatsPoller};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::MicropadApp;
use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, mut app: MicropadApp) -> Result<()> {
        if cli.command.needs_device() {
            app.connect(cli.device.as_deref()).await?;
        }

        let result = Self::dispatch(cli.command, &app).await;
        app.shutdown().await;
        result
    }

    async fn dispatch(command: Commands, app: &MicropadApp) -> Result<()> {
        match command {
            Commands::Scan => Self::handle_scan(app).await,
            Commands::Info => Self::handle_info(app).await,
            Commands::Profiles => Self::handle_profiles(app).await,
            Commands::Profile { id } => Self::handle_profile(app, id).await,
            Commands::Activate { id } => Self::handle_activate(app, id).await,
            Commands::Push { file } => Self::handle_push(app, &file).await,
            Commands::Stats { watch, interval } => Self::handle_stats(app, watch, interval).await,
            Commands::Events => Self::handle_events(app).await,
            Commands::Reset { yes } => Self::handle_reset(app, yes).await,
            Commands::Reboot => {
                let ack = app.handler().reboot().await?;
                check_ack("reboot", ack)?;
                println!("Device is rebooting");
                Ok(())
            }
        }
    }

    async fn handle_scan(app: &MicropadApp) -> Result<()> {
        let devices = app.transport().scan().await?;
        if devices.is_empty() {
            println!("No Micropad devices found");
            return Ok(());
        }

        for device in devices {
            let name = device.name.as_deref().unwrap_or("<unnamed>");
            match device.rssi {
                Some(rssi) => println!("{}  {}  {} dBm", device.address, name, rssi),
                None => println!("{}  {}", device.address, name),
            }
        }
        Ok(())
    }

    async fn handle_info(app: &MicropadApp) -> Result<()> {
        let info = app
            .handler()
            .get_device_info()
            .await?
            .ok_or_else(|| CliError::NoData("device info".into()))?;
        print_json(&info)
    }

    async fn handle_profiles(app: &MicropadApp) -> Result<()> {
        let profiles = app
            .handler()
            .list_profiles()
            .await?
            .ok_or_else(|| CliError::NoData("profile list".into()))?;

        for profile in profiles {
            println!("{:>3}  {}  ({} bytes)", profile.id, profile.name, profile.size);
        }
        Ok(())
    }

    async fn handle_profile(app: &MicropadApp, id: u32) -> Result<()> {
        let profile = app
            .handler()
            .get_profile(id)
            .await?
            .ok_or_else(|| CliError::NoData(format!("profile {}", id)))?;
        print_json(&profile)
    }

    async fn handle_activate(app: &MicropadApp, id: u32) -> Result<()> {
        let ack = app.handler().set_active_profile(id).await?;
        check_ack("setActiveProfile", ack)?;
        println!("Profile {} is now active", id);
        Ok(())
    }

    async fn handle_push(app: &MicropadApp, file: &Path) -> Result<()> {
        let text = std::fs::read_to_string(file)?;
        let profile: Profile = serde_json::from_str(&text)?;

        info!("Uploading profile {} ({})", profile.id, profile.name);
        let ack = app.handler().set_profile(&profile).await?;
        check_ack("setProfile", ack)?;
        println!("Profile {} saved", profile.id);
        Ok(())
    }

    async fn handle_stats(app: &MicropadApp, watch: bool, interval: u64) -> Result<()> {
        if !watch {
            let stats = app
                .handler()
                .get_stats()
                .await?
                .ok_or_else(|| CliError::NoData("statistics".into()))?;
            return print_json(&stats);
        }

        info!("Polling statistics every {}s; press Ctrl+C to stop", interval);
        let poller = StatsPoller::spawn(app.handler().clone(), Duration::from_secs(interval));
        let mut snapshots = poller.subscribe();

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = snapshots.borrow_and_update().clone();
                    if let Some(stats) = latest {
                        println!(
                            "keys: {}  encoders: {:?}  uptime: {}s",
                            stats.total_key_presses(),
                            stats.encoder_turns,
                            stats.uptime
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        poller.stop();
        Ok(())
    }

    async fn handle_events(app: &MicropadApp) -> Result<()> {
        let mut session_events = app.handler().connection().subscribe();
        let mut device_events = app.handler().subscribe_events();
        info!("Listening for events; press Ctrl+C to stop");

        loop {
            tokio::select! {
                event = session_events.recv() => match event {
                    Ok(SessionEvent::Connected { device_name }) => {
                        println!("connected {}", device_name.unwrap_or_default());
                    }
                    Ok(SessionEvent::Disconnected) => println!("disconnected"),
                    Ok(SessionEvent::MessageReceived(_)) => {}
                    Err(RecvError::Lagged(skipped)) => warn!("Skipped {} session events", skipped),
                    Err(RecvError::Closed) => break,
                },
                event = device_events.recv() => match event {
                    Ok(envelope) => match envelope.profile_changed() {
                        Some(profile_id) => println!("profile changed to {}", profile_id),
                        None => print_json(&envelope)?,
                    },
                    Err(RecvError::Lagged(skipped)) => warn!("Skipped {} device events", skipped),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        Ok(())
    }

    async fn handle_reset(app: &MicropadApp, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(CliError::Config(
                "Factory reset erases every profile; rerun with --yes to confirm".to_string(),
            ));
        }

        let ack = app.handler().factory_reset().await?;
        check_ack("factoryReset", ack)?;
        println!("Device reset to factory defaults");
        Ok(())
    }
}

fn check_ack(command: &str, ack: CommandAck) -> Result<()> {
    if ack.success {
        Ok(())
    } else {
        Err(CliError::Rejected {
            command: command.to_string(),
            reason: ack.error.unwrap_or_else(|| "no reason given".to_string()),
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
