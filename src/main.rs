use std::error::Error;
use std::sync::Arc;

use yt_crud::config::Strategy;
use yt_crud::{Authenticator, Dispatcher, Ui};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "secrets.json".to_string());
    let config = yt_crud::read_config(&path).await?;
    log::info!("loaded {} using the {:?} strategy", path, config.strategy);

    let auth = Authenticator::from_config(&config)?;
    if config.strategy == Strategy::InteractiveOAuth {
        // Consent happens once, before the UI starts.
        auth.credential().await?;
    }

    let ui = Arc::new(Ui::new(Dispatcher::from_config(&config, auth)));
    let listener = tokio::net::TcpListener::bind(config.ui_addr).await?;
    println!(
        "Open http://{} in your browser. Press Ctrl-C to quit.",
        listener.local_addr()?
    );

    yt_crud::ui::serve(ui, listener, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
        log::info!("shutting down");
    })
    .await?;
    Ok(())
}
