//! Interactive OAuth login through a local callback listener.
//!
//! The user's browser is sent to the Threads authorization page, which redirects back to
//! `http://127.0.0.1:<port>/callback` with a one-time code. [`CallbackListener`] serves that
//! redirect, checks the CSRF `state`, and then trades the code for a token in the background:
//! short-lived token, best-effort upgrade to a long-lived one, and a profile fetch.

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::threads_api::{ThreadsClient, UserProfile};
use http::header::{CONTENT_TYPE, HeaderValue, LOCATION};
use http::StatusCode;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use jiff::Timestamp;
use oauth2::{AuthorizationCode, CsrfToken};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

const WAITING_HTML: &str = "<!doctype html><html><body>\
<h1>Waiting for Threads</h1><p>Finish signing in in the Threads tab.</p></body></html>";
/// How long the listener lingers after a successful login so the browser can load the
/// confirmation page it was redirected to.
const SUCCESS_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_HTML: &str = "<!doctype html><html><body>\
<h1>Signed in to Threads</h1><p>You may close this tab.</p></body></html>";

/// Result of a completed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: UserProfile,
    /// Whether the short-lived token was upgraded to a long-lived one.
    pub long_lived: bool,
    pub expires_at: Timestamp,
}

/// Settings for [`login`].
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Local port for the callback listener; `0` picks a free one.
    pub port: u16,
    /// How long to wait for the user to finish authorizing.
    pub deadline: Duration,
    /// Open the authorization URL in the user's browser. When `false` the URL is only logged.
    pub open_browser: bool,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            port: 0,
            deadline: Duration::from_secs(300),
            open_browser: true,
        }
    }
}

/// What the callback handler hands to [`CallbackListener::run`].
enum Callback {
    Code(AuthorizationCode),
    Failed(Error),
}

struct Shared {
    state: CsrfToken,
    callbacks: mpsc::Sender<Callback>,
    /// Only the first callback counts; later ones are turned away.
    handled: AtomicBool,
    /// Set once the confirmation page has been served after a callback.
    confirmed: AtomicBool,
}

/// A bound local listener waiting for exactly one OAuth redirect.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
    state: CsrfToken,
    redirect_uri: String,
    shutdown: CancellationToken,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>`; `0` picks a free port.
    ///
    /// Bind before sending the user to the authorization page so the redirect cannot race the
    /// listener.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        tracing::debug!(%addr, "callback listener bound");
        Ok(Self {
            listener,
            addr,
            // 256 bits of state
            state: CsrfToken::new_random_len(32),
            redirect_uri: format!("http://{addr}/callback"),
            shutdown: CancellationToken::new(),
        })
    }

    /// Uses a registered redirect URI (e.g. a tunnel forwarding to this listener) instead of the
    /// listener's own address.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The redirect URI embedded in the authorization URL and repeated in the code exchange.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The CSRF state this listener expects back.
    pub fn state(&self) -> &CsrfToken {
        &self.state
    }

    /// Fires to stop [`Self::run`] early; it then fails with [`Error::Cancelled`].
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Builds the URL the user must visit to authorize the application.
    pub fn authorization_url(&self, credentials: &Credentials, authorize_url: &str) -> Result<Url> {
        let mut url = Url::parse(authorize_url)
            .map_err(|e| Error::validation("authorize_url", format!("not a valid URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", credentials.client_id.as_str())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &credentials.scopes.join(","))
            .append_pair("response_type", "code")
            .append_pair("state", self.state.secret());
        Ok(url)
    }

    /// Serves the callback until exactly one of these happens:
    ///
    /// * a valid callback arrives and the token exchange completes: the outcome is returned;
    /// * the callback carries an error, a bad `state` or no code, or the exchange fails;
    /// * `deadline` passes: [`Error::Timeout`];
    /// * the client's cancellation token or [`Self::shutdown_handle`] fires: [`Error::Cancelled`].
    ///
    /// After a successful login the listener stays up for a short grace period, or until the
    /// confirmation page has been served, so the browser's redirect lands. Then the listener,
    /// every open connection and any in-flight exchange are torn down, whichever way it ended.
    pub async fn run(self, client: &ThreadsClient, deadline: Duration) -> Result<LoginOutcome> {
        let Self {
            listener,
            addr,
            state,
            redirect_uri,
            shutdown,
        } = self;
        let cancel = client.cancellation_token().clone();
        let (callbacks, mut received) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            state,
            callbacks,
            handled: AtomicBool::new(false),
            confirmed: AtomicBool::new(false),
        });

        let mut connections = JoinSet::new();
        let mut exchange = JoinSet::new();
        let timeout = tokio::time::sleep(deadline);
        let mut timeout = std::pin::pin!(timeout);

        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(Error::Cancelled("login".to_string())),
                () = shutdown.cancelled() => {
                    break Err(Error::Cancelled("callback listener shut down".to_string()));
                }
                () = &mut timeout => {
                    break Err(Error::Timeout(format!(
                        "no completed authorization within {}s",
                        deadline.as_secs()
                    )));
                }
                Some(joined) = exchange.join_next() => {
                    break joined.unwrap_or_else(|e| Err(Error::Api {
                        status: None,
                        message: format!("login task failed: {e}"),
                        body: None,
                        request_id: None,
                    }));
                }
                Some(callback) = received.recv() => match callback {
                    Callback::Code(code) => {
                        tracing::debug!("authorization code received, exchanging");
                        exchange.spawn(complete_login(client.clone(), code, redirect_uri.clone()));
                    }
                    Callback::Failed(e) => break Err(e),
                },
                accepted = listener.accept() => serve(accepted, &shared, &mut connections),
                Some(_) = connections.join_next() => {}
            }
        };

        if outcome.is_ok() {
            let grace = tokio::time::sleep(SUCCESS_GRACE);
            let mut grace = std::pin::pin!(grace);
            while !(shared.confirmed.load(Ordering::SeqCst) && connections.is_empty()) {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = shutdown.cancelled() => break,
                    () = &mut grace => break,
                    accepted = listener.accept() => serve(accepted, &shared, &mut connections),
                    Some(_) = connections.join_next() => {}
                }
            }
        }

        exchange.shutdown().await;
        connections.shutdown().await;
        drop(listener);
        tracing::debug!(%addr, ok = outcome.is_ok(), "callback listener closed");
        outcome
    }
}

/// Spawns a task serving one accepted callback connection.
fn serve(
    accepted: std::io::Result<(TcpStream, SocketAddr)>,
    shared: &Arc<Shared>,
    connections: &mut JoinSet<()>,
) {
    let (stream, peer) = match accepted {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::warn!(error = %e, "failed to accept callback connection");
            return;
        }
    };
    tracing::trace!(%peer, "callback connection");
    let shared = Arc::clone(shared);
    connections.spawn(async move {
        let io = hyper_util::rt::TokioIo::new(stream);
        let service = service_fn(move |req| handle(req, Arc::clone(&shared)));
        // one request per connection, so a finished task means a delivered response
        if let Err(e) = hyper::server::conn::http1::Builder::new()
            .keep_alive(false)
            .serve_connection(io, service)
            .await
        {
            tracing::debug!(error = %e, "callback connection ended with error");
        }
    });
}

/// Interactive login: binds a listener, sends the user to the authorization page, and waits.
///
/// On success `client` holds the new token.
pub async fn login(client: &ThreadsClient, options: LoginOptions) -> Result<LoginOutcome> {
    let mut listener = CallbackListener::bind(options.port).await?;
    if let Some(redirect_uri) = &client.tokens().credentials().redirect_uri {
        listener = listener.with_redirect_uri(redirect_uri.clone());
    }
    let url = listener.authorization_url(
        client.tokens().credentials(),
        &client.config().authorize_url,
    )?;

    tracing::info!(url = %url, "asking user to follow OAuth flow");
    if options.open_browser
        && let Err(e) = webbrowser::open(url.as_str())
    {
        tracing::warn!(error = %e, "could not open a browser, visit the URL manually");
    }
    listener.run(client, options.deadline).await
}

async fn complete_login(
    client: ThreadsClient,
    code: AuthorizationCode,
    redirect_uri: String,
) -> Result<LoginOutcome> {
    let cancel = client.cancellation_token().clone();
    let tokens = client.tokens();
    tokens.exchange_code(&code, &redirect_uri, &cancel).await?;

    let long_lived = match tokens.upgrade_to_long_lived(&cancel).await {
        Ok(()) => true,
        Err(e @ Error::Cancelled(_)) => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "keeping short-lived token, long-lived upgrade failed");
            false
        }
    };

    let user = client.get_me().await?;
    let expires_at = tokens
        .snapshot()
        .await
        .map(|state| state.expires_at)
        .ok_or_else(|| Error::authentication("token disappeared during login"))?;
    tracing::info!(user_id = %user.id, long_lived, %expires_at, "logged in to Threads");
    Ok(LoginOutcome {
        user,
        long_lived,
        expires_at,
    })
}

async fn handle(
    req: Request<Incoming>,
    shared: Arc<Shared>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    Ok(match req.uri().path() {
        "/" => html(StatusCode::OK, WAITING_HTML),
        "/success" => {
            if shared.handled.load(Ordering::SeqCst) {
                shared.confirmed.store(true, Ordering::SeqCst);
            }
            html(StatusCode::OK, SUCCESS_HTML)
        }
        "/callback" => {
            if shared.handled.swap(true, Ordering::SeqCst) {
                return Ok(text(StatusCode::CONFLICT, "authorization was already received"));
            }
            match check_callback(req.uri().query().unwrap_or(""), &shared.state) {
                Ok(code) => {
                    let _ = shared.callbacks.send(Callback::Code(code)).await;
                    let mut response = Response::new(Full::new(Bytes::new()));
                    *response.status_mut() = StatusCode::FOUND;
                    response
                        .headers_mut()
                        .insert(LOCATION, HeaderValue::from_static("/success"));
                    response
                }
                Err(e) => {
                    let response =
                        text(StatusCode::BAD_REQUEST, &format!("authorization failed: {e}"));
                    let _ = shared.callbacks.send(Callback::Failed(e)).await;
                    response
                }
            }
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    })
}

fn html(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Decodes a query string. Repeated keys keep their first value.
pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    params
}

/// Validates a callback query and extracts the authorization code.
fn check_callback(query: &str, expected: &CsrfToken) -> Result<AuthorizationCode> {
    let params = parse_query(query);

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .or_else(|| params.get("error_reason"))
            .map(String::as_str)
            .unwrap_or("no description");
        return Err(Error::authentication(format!(
            "authorization denied ({error}): {description}"
        )));
    }

    let presented = params.get("state").map(String::as_str).unwrap_or("");
    if presented.is_empty()
        || !constant_time_eq(presented.as_bytes(), expected.secret().as_bytes())
    {
        return Err(Error::authentication(
            "CSRF check failed: callback state does not match",
        ));
    }

    match params.get("code") {
        Some(code) if !code.trim().is_empty() => Ok(AuthorizationCode::new(code.clone())),
        _ => Err(Error::authentication("callback carried no authorization code")),
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn state() -> CsrfToken {
        CsrfToken::new("s3cr3t-state".to_string())
    }

    #[test]
    fn parse_query_decodes() {
        let params = parse_query("code=a%2Bb&state=st&code=second");
        assert_eq!(params.get("code").map(String::as_str), Some("a+b"));
        assert_eq!(params.get("state").map(String::as_str), Some("st"));
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn valid_callback_yields_code() {
        let code = check_callback("code=abc123&state=s3cr3t-state", &state()).unwrap();
        assert_eq!(code.secret(), "abc123");
    }

    #[test]
    fn single_character_state_mismatch_is_rejected() {
        let err = check_callback("code=abc123&state=s3cr3t-statf", &state()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("CSRF"));
    }

    #[test]
    fn missing_or_empty_state_is_rejected() {
        for query in ["code=abc123", "code=abc123&state=", "state=&code=x"] {
            let err = check_callback(query, &state()).unwrap_err();
            assert!(err.to_string().contains("CSRF"), "{query}");
        }
    }

    #[test]
    fn missing_code_is_rejected() {
        let err = check_callback("state=s3cr3t-state", &state()).unwrap_err();
        assert!(err.to_string().contains("no authorization code"));
    }

    #[test]
    fn provider_error_is_surfaced() {
        let err = check_callback(
            "error=access_denied&error_description=Permissions+error&state=s3cr3t-state",
            &state(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("Permissions error"));
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[tokio::test]
    async fn authorization_url_carries_every_parameter() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let credentials = Credentials::new("1234", "hunter2")
            .with_scopes(["threads_basic", "threads_content_publish"]);
        let url = listener
            .authorization_url(&credentials, "https://threads.net/oauth/authorize")
            .unwrap();
        let params = parse_query(url.query().unwrap());
        assert_eq!(params["client_id"], "1234");
        assert_eq!(params["redirect_uri"], listener.redirect_uri());
        assert_eq!(params["scope"], "threads_basic,threads_content_publish");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], *listener.state().secret());
        assert_eq!(listener.state().secret().len(), 43);
        assert!(!url.as_str().contains("hunter2"));
    }
}
