/// IBF (early-warning portal) API client.
///
/// Logs in with the configured user, caches the bearer token for the life of
/// the client, and retries requests that fail at connection level. Any
/// response status of 400 or above is an error carrying the response body.
///
/// Endpoints used:
/// - `user/login` (form) -> `{ "user": { "token": ... } }`
/// - `admin-areas/{ISO3}/{level}` -> GeoJSON feature collection
/// - `admin-area-dynamic-data/exposure` (JSON)
/// - `admin-area-dynamic-data/raster/{hazard}` (multipart, field `file`)
/// - `events/process` (JSON)

use std::cell::RefCell;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::Deserialize;

use crate::ingest::boundaries::{AdminBoundaries, BoundarySource};
use crate::logging::{self, Stage};
use crate::model::PipelineError;
use crate::publish::Publisher;
use crate::publish::exposure::{ExposurePayload, ProcessNotification};
use crate::publish::raster::RasterLayer;
use crate::secrets::{IBF_API_PASSWORD, IBF_API_URL, IBF_API_USER, Secrets};

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_secrets(secrets: &Secrets) -> Result<Self, PipelineError> {
        Ok(Credentials {
            base_url: secrets.get(IBF_API_URL)?.to_string(),
            email: secrets.get(IBF_API_USER)?.to_string(),
            password: secrets.get(IBF_API_PASSWORD)?.to_string(),
        })
    }
}

/// Retry schedule for connection-level failures. The wait doubles after
/// every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 5, backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// `base` joined with `path`, tolerant of a trailing or leading slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: LoginUser,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    token: String,
}

fn network_error(url: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::Network(format!("{}: {}", url, e))
}

/// Turns a response with status >= 400 into an HTTP error.
fn check_status(url: &str, response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PipelineError::Http { status: status.as_u16(), url: url.to_string(), body })
}

// ============================================================================
// Client
// ============================================================================

pub struct IbfClient {
    http: Client,
    credentials: Credentials,
    retry: RetryPolicy,
    token: RefCell<Option<String>>,
}

impl IbfClient {
    pub fn new(credentials: Credentials) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::Network(format!("cannot build HTTP client: {}", e)))?;
        Ok(IbfClient {
            http,
            credentials,
            retry: RetryPolicy::default(),
            token: RefCell::new(None),
        })
    }

    pub fn from_secrets(secrets: &Secrets) -> Result<Self, PipelineError> {
        Self::new(Credentials::from_secrets(secrets)?)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.credentials.base_url, path)
    }

    /// Sends the request built by `build`, rebuilding it for every attempt.
    /// Only connect and timeout failures are retried.
    fn send(&self, url: &str, build: impl Fn() -> Result<RequestBuilder, PipelineError>) -> Result<Response, PipelineError> {
        let mut attempt = 1;
        loop {
            match build()?.send() {
                Ok(response) => return check_status(url, response),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_attempts => {
                    logging::warn(
                        Stage::Publish,
                        Some(url),
                        &format!("attempt {}/{} failed: {}", attempt, self.retry.max_attempts, e),
                    );
                    thread::sleep(self.retry.delay(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(network_error(url, e)),
            }
        }
    }

    /// Logs in and caches the token.
    pub fn login(&self) -> Result<String, PipelineError> {
        let url = self.url("user/login");
        let response = self.send(&url, || {
            Ok(self.http.post(&url).form(&[
                ("email", self.credentials.email.as_str()),
                ("password", self.credentials.password.as_str()),
            ]))
        })?;
        let login: LoginResponse = response.json().map_err(|e| {
            PipelineError::Parse(format!("unexpected login response from {}: {}", url, e))
        })?;
        *self.token.borrow_mut() = Some(login.user.token.clone());
        Ok(login.user.token)
    }

    fn token(&self) -> Result<String, PipelineError> {
        let cached = self.token.borrow().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.login(),
        }
    }

    fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<(), PipelineError> {
        let url = self.url(path);
        let token = self.token()?;
        self.send(&url, || {
            Ok(self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("Accept", "application/json")
                .json(body))
        })?;
        Ok(())
    }

    pub fn get_text(&self, path: &str) -> Result<String, PipelineError> {
        let url = self.url(path);
        let token = self.token()?;
        let response = self.send(&url, || {
            Ok(self
                .http
                .get(&url)
                .bearer_auth(&token)
                .header("Accept", "application/json"))
        })?;
        response.text().map_err(|e| network_error(&url, e))
    }
}

impl Publisher for IbfClient {
    fn post_exposure(&mut self, payload: &ExposurePayload) -> Result<(), PipelineError> {
        self.post_json("admin-area-dynamic-data/exposure", payload)
    }

    fn post_raster(&mut self, layer: &RasterLayer) -> Result<(), PipelineError> {
        let url = self.url(&format!("admin-area-dynamic-data/raster/{}", layer.hazard.as_str()));
        let token = self.token()?;
        let grid = layer.to_ascii_grid();
        self.send(&url, || {
            let part = multipart::Part::text(grid.clone())
                .file_name(layer.file_name.clone())
                .mime_str("text/plain")
                .map_err(|e| network_error(&url, e))?;
            Ok(self
                .http
                .post(&url)
                .bearer_auth(&token)
                .multipart(multipart::Form::new().part("file", part)))
        })?;
        Ok(())
    }

    fn notify_processed(&mut self, notification: &ProcessNotification) -> Result<(), PipelineError> {
        self.post_json("events/process", notification)
    }
}

impl BoundarySource for IbfClient {
    fn admin_boundaries(&self, country: &str, adm_level: u8) -> Result<AdminBoundaries, PipelineError> {
        let text = self.get_text(&format!("admin-areas/{}/{}", country, adm_level))?;
        AdminBoundaries::from_geojson_str(adm_level, &text)
    }
}

// ============================================================================
// Tests
// ============================================================================
