use std::sync::Arc;

use encore_extension::Headless;
use encore_host::commands::{self, Console, Outcome};
use encore_host::{
    Companion, HostConfig, HostError, HostEvent, HostOrchestrator, LastfmConnector, ManifestSource,
};
use encore_settings::SettingsStore;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), HostError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = HostConfig::from_env();

    tracing::info!(path = %config.settings.path.display(), "opening settings");
    let settings = Arc::new(SettingsStore::open(&config.settings.path)?);

    let headless = Headless::new();
    let ctx = headless.context(settings.clone(), &config.resource_dir);
    let connector = Arc::new(LastfmConnector::new(
        config.lastfm.clone(),
        config.session_secret.clone(),
    ));
    let companion = Companion::probe(config.fpcalc_path.as_deref());

    let (orchestrator, inbox) = HostOrchestrator::new(
        ctx,
        connector.clone(),
        companion,
        ManifestSource::Path(config.manifest_path.clone()),
    );
    let orchestrator = orchestrator.with_lookup_timeout(config.lookup_timeout);
    let events = orchestrator.sender();

    {
        let events = events.clone();
        headless.player.on_change(move |playing| {
            let _ = events.send(HostEvent::PlayingChanged { playing });
        });
    }

    let host = tokio::spawn(orchestrator.run(inbox));

    let mut console = Console::new(settings, headless, connector, events.clone());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    println!("{}", commands::HELP);

    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match console.execute(command).await {
            Ok(Outcome::Continue(Some(reply))) => println!("{reply}"),
            Ok(Outcome::Continue(None)) => {}
            Ok(Outcome::Quit) => break,
            Err(e) => println!("{e}"),
        }
    }

    tracing::info!("shutting down");
    let _ = events.send(HostEvent::Shutdown);
    host.await?;
    Ok(())
}
