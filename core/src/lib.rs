//! Asynchronous connector for a cloud "Things" REST API.
//!
//! # Overview
//! `Connector` creates, lists and deletes things under a configured base
//! URL. Every request carries `Content-Type: application/json` and the
//! `x-cr-api-token` header; basic-auth credentials are supplied only when
//! the server challenges.
//!
//! # Design
//! - Sending schedules a request and binds a callback to it; the caller
//!   drives completions with `Connector::run`, a single-task cooperative
//!   loop. Callbacks receive `&mut Connector` and chain further requests.
//! - Every completion, including transport failures and 4xx/5xx statuses,
//!   reaches its callback as a `Reply`. Only programmer errors (bad URL,
//!   unserializable body, send after close) are `Err`.
//! - Network I/O sits behind the `Transport` trait so request building and
//!   dispatch can be tested with a scripted transport.
//! - `close()` resolves every `Finished` handle, replacing a global
//!   "finished" signal.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod reply;
pub mod transport;

pub use client::{Callback, Connector, Finished};
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use reply::{Reply, RequestId};
pub use transport::{CredentialProvider, Credentials, ReqwestTransport, Transport};
pub use url::Url;
