use crate::client::{form_post, HttpClient};
use crate::error::AuthError;
use crate::types::{ApplicationSecret, Credential};

use hyper_util::client::legacy::connect::Connect;
use url::form_urlencoded;

/// Implements the [OAuth2 Refresh Token Flow](https://developers.google.com/youtube/v3/guides/authentication#devices).
///
/// Refresh an expired access token, as obtained by any other authentication flow.
/// This flow is useful when your `Credential` is expired and allows to obtain a new
/// and valid access token.
pub(crate) struct RefreshFlow;

impl RefreshFlow {
    /// Attempt to refresh the given token, and obtain a new, valid one.
    /// If the result is `AuthError::Server`, your refresh token is invalid
    /// or your authorization was revoked. Therefore no further attempt shall be made,
    /// and you will have to re-authorize using the installed flow.
    ///
    /// # Arguments
    /// * `client_secret` - as obtained when [registering your application](https://developers.google.com/youtube/registering_an_application)
    /// * `refresh_token` - obtained during a previous consent flow
    pub(crate) async fn refresh_token<C>(
        client: &HttpClient<C>,
        client_secret: &ApplicationSecret,
        refresh_token: &str,
    ) -> Result<Credential, AuthError>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        log::debug!(
            "refreshing access token with refresh token {}",
            crate::helper::redact(refresh_token)
        );
        let req = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&[
                ("client_id", client_secret.client_id.as_str()),
                ("client_secret", client_secret.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .finish();

        let request = form_post(&client_secret.token_uri, req)?;
        let response = client.send(request).await?;
        log::debug!("received response; head: {:?}", response.head);
        let mut token = Credential::from_response(&response)?;
        // If the refresh result contains a refresh_token use it, otherwise
        // continue using our previous refresh_token.
        token
            .refresh_token
            .get_or_insert_with(|| refresh_token.to_owned());
        Ok(token)
    }
}
