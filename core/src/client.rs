//! Single-owner asynchronous connector for the Things REST API.
//!
//! # Design
//! `Connector` owns the transport, a table of pending callbacks keyed by
//! `RequestId`, and the set of in-flight request futures. Sending only
//! schedules work and returns immediately; nothing touches the network until
//! the caller drives `run()`. `run()` is a cooperative loop on the caller's
//! task: it polls the in-flight futures, and for each finished request
//! removes its callback from the table and invokes it exactly once with
//! `&mut Connector`, so the callback can chain the next request.
//!
//! Each request carries its own callback binding and its own start instant.
//! No state is shared between two in-flight requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, API_TOKEN_HEADER, APPLICATION_JSON, CONTENT_TYPE};
use crate::reply::{Reply, RequestId};
use crate::transport::{CredentialProvider, ReqwestTransport, Transport};

/// Completion handler bound to one request.
pub type Callback = Box<dyn FnOnce(&mut Connector, Reply)>;

/// What an in-flight future resolves to.
struct Completion {
    id: RequestId,
    method: HttpMethod,
    url: Url,
    outcome: Result<HttpResponse, TransportError>,
    elapsed: Duration,
}

pub struct Connector {
    config: Arc<ClientConfig>,
    base: Url,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    next_id: u64,
    pending: HashMap<RequestId, Callback>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    finished: watch::Sender<bool>,
}

impl Connector {
    /// Connector over the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        let base = config.validate()?;
        let config = Arc::new(config);
        let (finished, _) = watch::channel(false);
        Ok(Self {
            credentials: config.clone(),
            config,
            base,
            transport,
            next_id: 1,
            pending: HashMap::new(),
            in_flight: FuturesUnordered::new(),
            finished,
        })
    }

    /// Replace the configured username/password as the challenge answerer.
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    /// `POST {base}/things` with `thing` serialized compactly.
    pub fn build_create_thing<T: Serialize + ?Sized>(&self, thing: &T) -> Result<HttpRequest, ClientError> {
        let body = serde_json::to_string(thing)?;
        Ok(self.request(HttpMethod::Post, self.things_url(None)?, Some(body)))
    }

    /// `GET {base}/things?ids=a,b`. An empty slice still sends `ids=`.
    pub fn build_list_things<S: AsRef<str>>(&self, ids: &[S]) -> Result<HttpRequest, ClientError> {
        let mut url = self.things_url(None)?;
        let joined = ids
            .iter()
            .map(|id| form_urlencoded::byte_serialize(id.as_ref().as_bytes()).collect::<String>())
            .collect::<Vec<_>>()
            .join(",");
        url.set_query(Some(&format!("ids={joined}")));
        Ok(self.request(HttpMethod::Get, url, None))
    }

    /// `DELETE {base}/things/{id}`.
    pub fn build_delete_thing(&self, id: &str) -> Result<HttpRequest, ClientError> {
        if id.is_empty() {
            return Err(ClientError::InvalidUrl("thing id must not be empty".to_string()));
        }
        Ok(self.request(HttpMethod::Delete, self.things_url(Some(id))?, None))
    }

    fn things_url(&self, id: Option<&str>) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("things");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: HttpMethod, url: Url, body: Option<String>) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: vec![
                (CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()),
                (API_TOKEN_HEADER.to_string(), self.config.api_token.clone()),
            ],
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    pub fn create_thing<T, F>(&mut self, thing: &T, callback: F) -> Result<RequestId, ClientError>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&mut Connector, Reply) + 'static,
    {
        let request = self.build_create_thing(thing)?;
        self.send_request(request, callback)
    }

    pub fn list_things<S, F>(&mut self, ids: &[S], callback: F) -> Result<RequestId, ClientError>
    where
        S: AsRef<str>,
        F: FnOnce(&mut Connector, Reply) + 'static,
    {
        let request = self.build_list_things(ids)?;
        self.send_request(request, callback)
    }

    pub fn delete_thing<F>(&mut self, id: &str, callback: F) -> Result<RequestId, ClientError>
    where
        F: FnOnce(&mut Connector, Reply) + 'static,
    {
        let request = self.build_delete_thing(id)?;
        self.send_request(request, callback)
    }

    /// Schedule `request` and bind `callback` to its completion.
    ///
    /// Returns as soon as the request is queued. The callback fires from a
    /// later iteration of `run()`, never from inside this call.
    pub fn send_request<F>(&mut self, request: HttpRequest, callback: F) -> Result<RequestId, ClientError>
    where
        F: FnOnce(&mut Connector, Reply) + 'static,
    {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let id = RequestId(self.next_id);
        self.next_id += 1;

        debug!(request = %id, method = %request.method, url = %request.url, "sending request");

        let transport = Arc::clone(&self.transport);
        let credentials = Arc::clone(&self.credentials);
        let method = request.method;
        let url = request.url.clone();
        let started = Instant::now();
        self.in_flight.push(
            async move {
                let outcome = transport.execute(request, credentials).await;
                Completion {
                    id,
                    method,
                    url,
                    outcome,
                    elapsed: started.elapsed(),
                }
            }
            .boxed(),
        );
        self.pending.insert(id, Box::new(callback));
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Drive in-flight requests until none remain, dispatching each
    /// completion to its callback. Returns how many callbacks ran.
    ///
    /// Requests scheduled by callbacks are driven by the same call.
    pub async fn run(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(completion) = self.in_flight.next().await {
            self.complete(completion);
            dispatched += 1;
        }
        dispatched
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            id,
            method,
            url,
            outcome,
            elapsed,
        } = completion;
        let elapsed_ms = elapsed.as_millis() as u64;
        match &outcome {
            Ok(response) => {
                info!(request = %id, %method, %url, status = response.status, elapsed_ms, "request finished");
            }
            Err(e) => {
                warn!(request = %id, %method, %url, elapsed_ms, error = %e, "request failed");
            }
        }

        // `send_request` inserts the callback and pushes the future together.
        let callback = self.pending.remove(&id);
        debug_assert!(callback.is_some(), "request {id} finished without a pending callback");
        if let Some(callback) = callback {
            callback(self, Reply::new(id, method, url, outcome, elapsed));
        }
    }

    /// Number of requests sent whose callback has not run yet.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Signal finished to every `Finished` handle. Only the first call has
    /// an effect. Requests already in flight still complete under `run()`.
    pub fn close(&self) {
        let changed = self.finished.send_if_modified(|closed| !std::mem::replace(closed, true));
        if changed {
            info!(in_flight = self.pending.len(), "connector closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.finished.borrow()
    }

    /// Handle that resolves once `close()` is called.
    pub fn finished(&self) -> Finished {
        Finished(self.finished.subscribe())
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("base", &self.base.as_str())
            .field("in_flight", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Completion handle for `Connector::close`.
#[derive(Debug, Clone)]
pub struct Finished(watch::Receiver<bool>);

impl Finished {
    /// Wait for `close()`. Returns `false` if the connector was dropped
    /// without being closed.
    pub async fn wait(mut self) -> bool {
        let closed = self.0.wait_for(|closed| *closed).await.is_ok();
        closed
    }

    pub fn is_finished(&self) -> bool {
        *self.0.borrow()
    }
}
