//! HTTP Digest Authentication (RFC 2617) client for AMT endpoints.
//!
//! AMT firmware only speaks the "auth" quality-of-protection variant, so
//! qop is pinned to `auth` regardless of what the server offers. The
//! challenge is sticky per client instance; nonce-count, client-nonce and
//! response are recomputed on every request.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use md5::{Digest as _, Md5};
use reqwest::Client as HttpClient;

use crate::error::{AmtError, ConfigError};

/// TLS options applied when building the underlying HTTP client.
///
/// If `skip_verify` is set, any CA material is ignored. If CA bytes are
/// present, verification uses exactly that trust root; the system store
/// is never consulted.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub ca_pem: Option<Vec<u8>>,
}

/// Server challenge parsed from a `WWW-Authenticate` header.
///
/// Immutable once parsed; replaced wholesale when the server issues a
/// fresh 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub algorithm: String,
    pub realm: String,
    pub nonce: String,
    pub opaque: String,
    pub userhash: bool,
}

impl Challenge {
    /// Parse a `WWW-Authenticate: Digest ...` header value
    pub fn parse(header: &str) -> Result<Self, AmtError> {
        let rest = header
            .trim()
            .strip_prefix("Digest ")
            .ok_or_else(|| AmtError::AuthChallengeMalformed(header.to_string()))?;

        let params = parse_params(rest);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };

        let nonce = get("nonce");
        if nonce.is_empty() {
            return Err(AmtError::AuthChallengeMalformed(header.to_string()));
        }

        Ok(Self {
            algorithm: get("algorithm"),
            realm: get("realm"),
            nonce,
            opaque: get("opaque"),
            userhash: get("userhash").eq_ignore_ascii_case("true"),
        })
    }
}

/// Split `key=value, key="value"` pairs from a digest header
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for part in split_unquoted_commas(input) {
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');
            params.push((key.trim().to_string(), value.to_string()));
        }
    }
    params
}

/// Split on commas that are not inside quoted values
fn split_unquoted_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Per-request authorization state derived from a challenge.
///
/// Owned as a value; `refresh` returns a new context with the nonce-count
/// incremented, a fresh client-nonce and a recomputed response. A context
/// is never reused verbatim across requests.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub username: String,
    pub realm: String,
    pub algorithm: String,
    pub nonce: String,
    pub opaque: String,
    pub userhash: bool,
    /// Path+query of the request target; never the authority
    pub digest_uri: String,
    pub nc: u32,
    pub cnonce: String,
    pub response: String,
}

impl AuthorizationContext {
    /// Build a fresh context from a challenge (nc starts at 1)
    pub fn build(
        challenge: &Challenge,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
    ) -> Result<Self, AmtError> {
        // username is hashed with the realm when the challenge demands it
        let digest_username = if challenge.userhash {
            md5_hex(&format!("{}:{}", username, challenge.realm))
        } else {
            username.to_string()
        };

        let base = Self {
            username: digest_username,
            realm: challenge.realm.clone(),
            algorithm: challenge.algorithm.clone(),
            nonce: challenge.nonce.clone(),
            opaque: challenge.opaque.clone(),
            userhash: challenge.userhash,
            digest_uri: request_uri(uri)?,
            nc: 0,
            cnonce: String::new(),
            response: String::new(),
        };
        Ok(base.refresh(password, method))
    }

    /// Produce the next context: nc+1, fresh cnonce, recomputed response
    pub fn refresh(&self, password: &str, method: &str) -> Self {
        let mut next = self.clone();
        next.nc = self.nc + 1;
        next.cnonce = make_cnonce(&self.username);
        next.response = compute_response(
            method,
            &next.digest_uri,
            &next.username,
            &next.realm,
            password,
            &next.nonce,
            next.nc,
            &next.cnonce,
        );
        next
    }

    /// Render the `Authorization` header value, omitting empty fields
    pub fn header_value(&self) -> String {
        let mut fields = Vec::new();

        if !self.username.is_empty() {
            fields.push(format!("username=\"{}\"", self.username));
        }
        if !self.realm.is_empty() {
            fields.push(format!("realm=\"{}\"", self.realm));
        }
        if !self.algorithm.is_empty() {
            fields.push(format!("algorithm={}", self.algorithm));
        }
        if !self.nonce.is_empty() {
            fields.push(format!("nonce=\"{}\"", self.nonce));
        }
        if !self.digest_uri.is_empty() {
            fields.push(format!("uri=\"{}\"", self.digest_uri));
        }
        if !self.cnonce.is_empty() {
            fields.push(format!("cnonce=\"{}\"", self.cnonce));
        }
        if self.nc != 0 {
            fields.push(format!("nc={:08x}", self.nc));
        }
        fields.push("qop=auth".to_string());
        if !self.opaque.is_empty() {
            fields.push(format!("opaque=\"{}\"", self.opaque));
        }
        if !self.response.is_empty() {
            fields.push(format!("response=\"{}\"", self.response));
        }
        if self.userhash {
            fields.push("userhash=true".to_string());
        }

        format!("Digest {}", fields.join(", "))
    }
}

/// Compute the RFC 2617 response digest for the "auth" qop variant.
///
/// Pure function of its inputs; deterministic given a fixed cnonce/nc.
#[allow(clippy::too_many_arguments)]
pub fn compute_response(
    method: &str,
    digest_uri: &str,
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    nc: u32,
    cnonce: &str,
) -> String {
    let a1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let a2 = md5_hex(&format!("{}:{}", method, digest_uri));
    md5_hex(&format!("{}:{}:{:08x}:{}:auth:{}", a1, nonce, nc, cnonce, a2))
}

/// Liveness nonce, not a secret: a high-resolution timestamp mixed with
/// the username is sufficient
fn make_cnonce(username: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    md5_hex(&format!("{}:{}:amtctl", nanos, username))
}

/// Path+query portion of the request target, as used in the digest
fn request_uri(uri: &str) -> Result<String, AmtError> {
    let url = reqwest::Url::parse(uri)
        .map_err(|e| AmtError::Transport(format!("invalid URI {}: {}", uri, e)))?;
    Ok(match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    })
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// HTTP client executing digest-authenticated requests.
///
/// The first call runs the 401 preflight and caches the challenge;
/// subsequent calls go straight to a refreshed authorization. Connections
/// are closed after every exchange, matching AMT firmware expectations.
#[derive(Debug)]
pub struct DigestClient {
    http: HttpClient,
    username: String,
    password: String,
    auth: Option<AuthorizationContext>,
}

impl DigestClient {
    /// Build a client. A malformed CA certificate is a fatal
    /// configuration error here, not a per-request failure.
    pub fn new(
        username: &str,
        password: &str,
        timeout: Duration,
        tls: &TlsConfig,
    ) -> Result<Self, ConfigError> {
        let mut builder = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .http1_only()
            // legacy AMT firmware caps out at TLS 1.0
            .max_tls_version(reqwest::tls::Version::TLS_1_0)
            .tls_built_in_root_certs(false);

        if tls.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(pem) = &tls.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ConfigError::InvalidCaCert(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            username: username.to_string(),
            password: password.to_string(),
            auth: None,
        })
    }

    /// Execute one digest-authenticated exchange and return the HTTP
    /// status and response body.
    pub async fn execute(
        &mut self,
        method: &str,
        uri: &str,
        body: &str,
    ) -> Result<(u16, String), AmtError> {
        if let Some(prev) = &self.auth {
            let auth = prev.refresh(&self.password, method);
            let header = auth.header_value();
            self.auth = Some(auth);
            return self.send(method, uri, body, Some(header)).await;
        }

        // Unauthenticated preflight to obtain the challenge
        let resp = self.send_raw(method, uri, body, None).await?;
        let status = resp.status().as_u16();
        if status != 401 {
            let text = resp.text().await.map_err(AmtError::from)?;
            return Ok((status, text));
        }

        let challenge_header = resp
            .headers()
            .get("www-authenticate")
            .ok_or(AmtError::AuthChallengeMissing)?
            .to_str()
            .map_err(|_| AmtError::AuthChallengeMissing)?
            .to_string();
        drop(resp);

        let challenge = Challenge::parse(&challenge_header)?;
        let auth =
            AuthorizationContext::build(&challenge, &self.username, &self.password, method, uri)?;
        let header = auth.header_value();
        self.auth = Some(auth);
        self.send(method, uri, body, Some(header)).await
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: &str,
        auth_header: Option<String>,
    ) -> Result<(u16, String), AmtError> {
        let resp = self.send_raw(method, uri, body, auth_header).await?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(AmtError::from)?;
        Ok((status, text))
    }

    async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        body: &str,
        auth_header: Option<String>,
    ) -> Result<reqwest::Response, AmtError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| AmtError::Transport(format!("invalid HTTP method: {}", method)))?;

        let mut req = self
            .http
            .request(method, uri)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("Connection", "close")
            .body(body.to_string());

        if let Some(value) = auth_header {
            req = req.header("Authorization", value);
        }

        req.send().await.map_err(AmtError::from)
    }
}
