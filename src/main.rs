mod app;
mod error;
mod settings;
mod speedtest;
mod ui;

use anyhow::Result;
use app::{run_network_check, App};
use clap::Parser;
use crossterm::style::Stylize;
use log::{info, warn};
use settings::Settings;
use speedtest::delegate::list_servers;
use std::io::{IsTerminal, Write};
use tokio::sync::mpsc;
use ui::{render_report, render_server_list};

#[derive(Parser, Debug)]
#[command(name = "netcheck", version)]
#[command(about = "Measure latency, packet loss, DNS time and bandwidth, then print a report")]
struct Cli {
    /// Run speedtest-cli against this server ID instead of the nearest one
    #[arg(long, value_name = "ID")]
    server: Option<String>,

    /// Print the speedtest servers speedtest-cli offers and exit
    #[arg(long)]
    list_servers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let settings = Settings::default().with_server(cli.server);
    let color = std::io::stdout().is_terminal();

    if cli.list_servers {
        return print_server_list(&settings, color).await;
    }

    let app = run_app(settings).await?;
    let report = render_report(&app.result, app.settings.tip_loss_threshold, color);

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(report.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn run_app(settings: Settings) -> Result<App> {
    let mut app = App::new(settings);
    let (tx, mut rx) = mpsc::channel(32);

    let probe_settings = app.settings.clone();
    let handle = tokio::spawn(async move { run_network_check(tx, probe_settings).await });

    let status_color = std::io::stderr().is_terminal();
    while let Some(update) = rx.recv().await {
        let previous = app.phase;
        app.handle_update(update);
        if app.phase != previous {
            if status_color {
                eprintln!("{}", app.phase.label().dim());
            } else {
                eprintln!("{}", app.phase.label());
            }
        }
    }

    handle.await??;
    app.complete_test();
    info!("Network check complete");
    Ok(app)
}

async fn print_server_list(settings: &Settings, color: bool) -> Result<()> {
    match list_servers(settings).await {
        Ok(entries) => print!("{}", render_server_list(&entries, color)),
        Err(e) => {
            warn!("Server listing failed: {}", e);
            println!("Could not list speedtest servers: {}", e);
        }
    }
    Ok(())
}
