use std::io::{BufRead, Write};
use std::time::Duration;

use gdrive_core::{DRIVE_SCOPE, OAuthClient, OAuthToken};
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use url::Url;

const CALLBACK_PATH: &str = "/callback";
/// Redirect shown during manual entry; the browser lands on an error page
/// whose address bar still carries the code.
const MANUAL_REDIRECT_URI: &str = "http://127.0.0.1/callback";
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] gdrive_core::OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("state parameter mismatch in redirect")]
    StateMismatch,
    #[error("authorization timed out")]
    Timeout,
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    StateMismatch,
    /// Favicon probes and other noise.
    Ignored,
}

/// Browser sign-in: a loopback listener catches the redirect, with manual
/// code entry on stdin when that does not work out.
pub struct OAuthFlow {
    client: OAuthClient,
    timeout: Duration,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        let state = random_state();
        let (code, redirect_uri) = match self.wait_for_code_via_loopback(&state).await {
            Ok(found) => found,
            Err(err @ OAuthFlowError::Denied(_)) => return Err(err),
            Err(err) => {
                warn!(
                    error = %err,
                    "loopback sign-in unavailable, falling back to manual code entry"
                );
                self.wait_for_code_manual(&state)?
            }
        };
        let token = self
            .client
            .exchange_code(&code, Some(&redirect_uri))
            .await?;
        info!("authorization completed");
        Ok(token)
    }

    async fn wait_for_code_via_loopback(
        &self,
        state: &str,
    ) -> Result<(String, String), OAuthFlowError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}{CALLBACK_PATH}");
        let url = self
            .client
            .authorize_url(&redirect_uri, Some(DRIVE_SCOPE), Some(state))?;

        println!("Open this URL in your browser to authorize shotsync:\n{url}");
        info!(port, "waiting for the browser redirect");

        let code = tokio::time::timeout(self.timeout, accept_callback(&listener, state))
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;
        Ok((code, redirect_uri))
    }

    fn wait_for_code_manual(&self, state: &str) -> Result<(String, String), OAuthFlowError> {
        let url = self
            .client
            .authorize_url(MANUAL_REDIRECT_URI, Some(DRIVE_SCOPE), Some(state))?;
        println!("Open this URL in your browser:\n{url}");
        print!("Paste the address of the page you were sent to, or just the code: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().lock().read_line(&mut input)?;
        let code = code_from_manual_input(&input).ok_or(OAuthFlowError::MissingCode)?;
        Ok((code, MANUAL_REDIRECT_URI.to_string()))
    }
}

async fn accept_callback(listener: &TcpListener, state: &str) -> Result<String, OAuthFlowError> {
    loop {
        let (mut stream, _) = listener.accept().await?;
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "failed to read loopback request");
                continue;
            }
        };
        match parse_callback(&request, state) {
            Callback::Code(code) => {
                respond(&mut stream, "200 OK", "Google Drive connected. You can close this tab.")
                    .await;
                return Ok(code);
            }
            Callback::Denied(reason) => {
                respond(&mut stream, "200 OK", "Authorization was not granted.").await;
                return Err(OAuthFlowError::Denied(reason));
            }
            Callback::StateMismatch => {
                respond(&mut stream, "400 Bad Request", "Unexpected state parameter.").await;
                return Err(OAuthFlowError::StateMismatch);
            }
            Callback::Ignored => respond(&mut stream, "404 Not Found", "Not found.").await,
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<String, OAuthFlowError> {
    let mut request = vec![0u8; 8192];
    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, stream.read(&mut request))
        .await
        .map_err(|_| OAuthFlowError::Timeout)??;
    Ok(String::from_utf8_lossy(&request[..read]).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn parse_callback(request: &str, expected_state: &str) -> Callback {
    let Some(url) = request_url(request) else {
        return Callback::Ignored;
    };
    if url.path() != CALLBACK_PATH {
        return Callback::Ignored;
    }
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Callback::Denied(error);
    }
    match code {
        Some(_) if state.as_deref() != Some(expected_state) => Callback::StateMismatch,
        Some(code) => Callback::Code(code),
        None => Callback::Ignored,
    }
}

fn request_url(request: &str) -> Option<Url> {
    let request_line = request.lines().next()?;
    let target = request_line.split_whitespace().nth(1)?;
    if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).ok()
    } else {
        Url::parse(&format!("http://127.0.0.1{target}")).ok()
    }
}

fn code_from_manual_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match Url::parse(input) {
        Ok(url) => url.query_pairs().find_map(|(key, value)| {
            (key == "code" && !value.is_empty()).then(|| value.into_owned())
        }),
        Err(_) => Some(input.to_string()),
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_when_state_matches() {
        let req = "GET /callback?state=xyz&code=4/abc123&scope=drive HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse_callback(req, "xyz"),
            Callback::Code("4/abc123".into())
        );
    }

    #[test]
    fn rejects_foreign_state() {
        let req = "GET /callback?state=other&code=abc HTTP/1.1\r\n\r\n";
        assert_eq!(parse_callback(req, "xyz"), Callback::StateMismatch);
    }

    #[test]
    fn reports_denied_consent() {
        let req = "GET /callback?error=access_denied&state=xyz HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse_callback(req, "xyz"),
            Callback::Denied("access_denied".into())
        );
    }

    #[test]
    fn ignores_unrelated_requests() {
        assert_eq!(
            parse_callback("GET /favicon.ico HTTP/1.1\r\n\r\n", "xyz"),
            Callback::Ignored
        );
        assert_eq!(
            parse_callback("GET /callback?state=xyz HTTP/1.1\r\n\r\n", "xyz"),
            Callback::Ignored
        );
        assert_eq!(parse_callback("", "xyz"), Callback::Ignored);
    }

    #[test]
    fn manual_input_accepts_url_or_bare_code() {
        assert_eq!(
            code_from_manual_input("http://127.0.0.1/callback?state=s&code=4%2Fabc\n").as_deref(),
            Some("4/abc")
        );
        assert_eq!(code_from_manual_input("  4/xyz \n").as_deref(), Some("4/xyz"));
        assert_eq!(code_from_manual_input("\n"), None);
        assert_eq!(
            code_from_manual_input("http://127.0.0.1/callback?error=access_denied"),
            None
        );
    }

    #[test]
    fn state_is_random_alphanumeric() {
        let one = random_state();
        let two = random_state();
        assert_eq!(one.len(), 32);
        assert!(one.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(one, two);
    }

    #[tokio::test]
    async fn loopback_listener_returns_code_from_redirect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let browser = tokio::spawn(async move {
            let mut probe = TcpStream::connect(addr).await.unwrap();
            probe
                .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut sink = Vec::new();
            probe.read_to_end(&mut sink).await.unwrap();

            let mut redirect = TcpStream::connect(addr).await.unwrap();
            redirect
                .write_all(b"GET /callback?code=good&state=s1 HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut page = String::new();
            redirect.read_to_string(&mut page).await.unwrap();
            page
        });

        let code = accept_callback(&listener, "s1").await.unwrap();
        let page = browser.await.unwrap();

        assert_eq!(code, "good");
        assert!(page.starts_with("HTTP/1.1 200 OK"));
    }
}
