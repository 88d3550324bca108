use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wardview_client_core::config::Config;
use wardview_client_core::model::{Scope, ViewModel};
use wardview_client_core::session::Session;

#[derive(Parser, Debug)]
#[command(name = "wardview", about = "Live ward state viewer")]
struct Cli {
    /// Follow the whole-ward station view.
    #[arg(long, conflicts_with = "token")]
    station: bool,

    /// Follow one admission's dashboard by its access token.
    #[arg(long)]
    token: Option<String>,

    /// Ward API base address.
    #[arg(long, env = "WARDVIEW_API_BASE", default_value = "127.0.0.1:8000")]
    api_base: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let scope = match (cli.station, cli.token) {
        (true, None) => Scope::Station,
        (false, Some(token)) => Scope::Admission { token },
        _ => bail!("pass either --station or --token <TOKEN>"),
    };

    let config = Config::new(&cli.api_base).context("invalid api base")?;
    let handle = Session::spawn(
        scope.clone(),
        &config,
        Some(Box::new(|| {
            println!("admission discharged; session ended");
        })),
    )
    .context("failed to start session")?;

    let mut view = handle.view();
    let mut connected = handle.connected();
    println!("following {} at {}", scope.channel_name(), config.base_url());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.stop().await;
                break;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                print_summary(&view.borrow());
            }
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *connected.borrow();
                println!("push channel {}", if up { "connected" } else { "disconnected" });
            }
        }
    }
    Ok(())
}

fn print_summary(view: &ViewModel) {
    match view {
        ViewModel::Station(station) => {
            let occupied = station.beds.iter().filter(|bed| bed.occupied()).count();
            let febrile = station.beds.iter().filter(|bed| bed.fever).count();
            println!(
                "ward: {occupied}/{} beds occupied, {febrile} febrile, {} alerts",
                station.beds.len(),
                station.notifications.len(),
            );
            if let Some(alert) = station.notifications.first() {
                println!("  latest alert [{}] {}", alert.room, alert.content);
            }
        }
        ViewModel::Admission(admission) => {
            let Some(meta) = &admission.admission else {
                return;
            };
            let latest_temp = admission
                .vitals
                .first()
                .map(|vital| format!("{:.1}", vital.temperature))
                .unwrap_or_else(|| "-".into());
            println!(
                "{} (room {}): temp {latest_temp}, {} vitals, {} iv records, {} meals, {} exams, {} document requests",
                meta.display_name,
                meta.room_number,
                admission.vitals.len(),
                admission.iv_records.len(),
                admission.meals.len(),
                admission.exam_schedules.len(),
                admission.document_requests.len(),
            );
        }
    }
}
