//! Create, read, update and delete YouTube videos from a local form UI.
//!
//! The crate has two halves. The credential provider ([`Authenticator`]) obtains an OAuth
//! access token with one of three strategies, chosen once from the [`Config`]:
//!
//! * `cached-oauth`: reuse the token cache on disk, refreshing it when it expired, and only
//!   ask the user for consent when that fails.
//! * `interactive-oauth`: ask for consent when the session starts, using a loopback redirect
//!   to a server spun up by this crate.
//! * `service-account`: sign a JWT with a service account key. No user interaction and no
//!   persistence.
//!
//! The [`Dispatcher`] then performs exactly one of the four video operations per call and
//! converts every failure into a [`Failure`] with a [`FailureKind`]. Updates merge the
//! caller's fields into the current snippet ([`merge_snippet`]) instead of replacing it.
//!
//! ```no_run
//! use yt_crud::{Authenticator, Dispatcher, OperationRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = yt_crud::read_config("secrets.json").await?;
//! let auth = Authenticator::from_config(&config)?;
//! let dispatcher = Dispatcher::from_config(&config, auth);
//!
//! let video = dispatcher
//!     .dispatch(&OperationRequest::Read { video_id: "dQw4w9WgXcQ".to_string() })
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&video)?);
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

pub mod authenticator;
pub mod authenticator_delegate;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
mod helper;
pub mod installed;
mod refresh;
pub mod request;
pub mod service_account;

/// Interface for storing tokens so that they can be re-used. There are built-in memory and
/// file-based storage providers. You can implement your own by implementing the TokenStorage trait.
pub mod storage;

mod types;
pub mod ui;
mod upload;
pub mod video;

#[doc(inline)]
pub use crate::authenticator::{AuthFlow, Authenticator};
#[doc(inline)]
pub use crate::config::{Config, Strategy};
#[doc(inline)]
pub use crate::dispatcher::{Dispatcher, OperationResult};
#[doc(inline)]
pub use crate::error::{AuthError, Failure, FailureKind};
pub use crate::helper::*;
pub use crate::request::{NewVideo, OperationRequest};
pub use crate::service_account::ServiceAccountKey;
pub use crate::types::{ApplicationSecret, ConsoleApplicationSecret, Credential};
pub use crate::ui::Ui;
pub use crate::video::{merge_snippet, PrivacyStatus, Snippet, SnippetPatch, VideoResource};
