//! Module containing types related to delegates.
use std::future::Future;
use std::pin::Pin;

/// InstalledFlowDelegate methods are called when the consent flow needs to ask the
/// application what to do in certain cases.
pub trait InstalledFlowDelegate: Send + Sync {
    /// Configure a custom redirect uri if needed.
    fn redirect_uri(&self) -> Option<&str> {
        None
    }

    /// We need the user to navigate to a URL using their browser. Once they grant access,
    /// the provider redirects the browser to the local server, which picks up the code.
    ///
    /// An error aborts the flow.
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(present_user_url(url))
    }
}

async fn present_user_url(url: &str) -> Result<(), String> {
    println!(
        "Please direct your browser to {} and follow the instructions displayed there.",
        url
    );
    if let Err(err) = open::that(url) {
        log::warn!("could not open a browser: {}", err);
    }
    Ok(())
}

/// Opens the consent page in the default browser and prints its URL.
#[derive(Copy, Clone)]
pub struct DefaultInstalledFlowDelegate;
impl InstalledFlowDelegate for DefaultInstalledFlowDelegate {}

