use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    env_value, GmailScope, Settings, CLIENT_ID_ENV, CLIENT_SECRET_ENV, GOOGLE_AUTH_URL,
    TOKEN_CACHE_KEY_ENV,
};

const CACHE_SKEW_SECONDS: i64 = 60;
const TOKEN_CACHE_KEY_BYTES: usize = 32;
const TOKEN_CACHE_NONCE_BYTES: usize = 12;
const TOKEN_CACHE_ENVELOPE_VERSION: u8 = 1;
const REDACTED_BODY_MAX_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientSecrets {
    /// Environment variables win over the downloaded `credentials.json`.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        if let (Some(client_id), Some(client_secret)) =
            (env_value(CLIENT_ID_ENV), env_value(CLIENT_SECRET_ENV))
        {
            return Ok(Self {
                client_id,
                client_secret,
            });
        }

        Self::from_file(&settings.credentials_path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "{} not found; download an OAuth desktop client from Google Cloud Console \
                 or set {CLIENT_ID_ENV} and {CLIENT_SECRET_ENV}",
                path.display()
            );
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read oauth client file {}", path.display()))?;
        Self::from_credentials_json(&raw)
            .with_context(|| format!("parse oauth client file {}", path.display()))
    }

    pub fn from_credentials_json(raw: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct ClientFile {
            installed: Option<ClientEntry>,
            web: Option<ClientEntry>,
        }

        #[derive(Deserialize)]
        struct ClientEntry {
            client_id: String,
            client_secret: String,
        }

        let file: ClientFile = serde_json::from_str(raw).context("decode client secrets JSON")?;
        let entry = file
            .installed
            .or(file.web)
            .ok_or_else(|| anyhow!("client secrets JSON has neither 'installed' nor 'web'"))?;
        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    fn from_response(response: OAuthTokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: Utc::now()
                + Duration::seconds((response.expires_in as i64).saturating_sub(CACHE_SKEW_SECONDS)),
            scope: response.scope,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: u64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptedTokenEnvelope {
    version: u8,
    nonce: String,
    ciphertext: String,
}

/// On-disk token cache. Encrypted with AES-256-GCM when a key is present.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
    key: Option<[u8; TOKEN_CACHE_KEY_BYTES]>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>, key: Option<[u8; TOKEN_CACHE_KEY_BYTES]>) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn from_env(path: impl Into<PathBuf>) -> Result<Self> {
        let key = env_value(TOKEN_CACHE_KEY_ENV)
            .map(|value| parse_token_cache_key_hex(&value))
            .transpose()
            .with_context(|| {
                format!("{TOKEN_CACHE_KEY_ENV} must be 64 hex characters (32 bytes)")
            })?;
        Ok(Self::new(path, key))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredToken>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("read token cache {}", self.path.display()))
            }
        };

        let decoded = match &self.key {
            Some(key) => decrypt_token(&raw, key).or_else(|decrypt_error| {
                serde_json::from_str::<StoredToken>(&raw).map_err(|_| decrypt_error)
            }),
            None => serde_json::from_str::<StoredToken>(&raw)
                .context("parse plain token cache (is it encrypted? set the cache key)"),
        };

        match decoded {
            Ok(token) => Ok(Some(token)),
            Err(error) => {
                warn!(
                    "discarding unreadable token cache {}: {error:#}",
                    self.path.display()
                );
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create token cache directory {}", parent.display()))?;
        }

        let contents = match &self.key {
            Some(key) => encrypt_token(token, key).context("encrypt token cache")?,
            None => serde_json::to_string_pretty(token).context("serialize token cache")?,
        };
        std::fs::write(&self.path, contents)
            .with_context(|| format!("write token cache {}", self.path.display()))?;
        restrict_permissions(&self.path)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("remove token cache {}", self.path.display()))
            }
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Hands out access tokens for one Gmail scope, refreshing or running the
/// browser consent flow when the cache cannot satisfy the request.
#[derive(Debug, Clone)]
pub struct Authenticator {
    client: Client,
    settings: Settings,
    scope: GmailScope,
}

impl Authenticator {
    pub fn new(client: Client, settings: Settings, scope: GmailScope) -> Self {
        Self {
            client,
            settings,
            scope,
        }
    }

    pub async fn access_token(&self) -> Result<String> {
        let store = TokenStore::from_env(self.settings.token_cache_path(self.scope))?;
        let cached = store.load()?;

        if let Some(token) = &cached {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let secrets = ClientSecrets::resolve(&self.settings)?;

        if let Some(refresh_token) = cached.and_then(|token| token.refresh_token) {
            match self.refresh(&secrets, &refresh_token).await {
                Ok(fresh) => {
                    store.save(&fresh)?;
                    return Ok(fresh.access_token);
                }
                Err(error) => warn!("token refresh failed, requesting new consent: {error:#}"),
            }
        }

        let fresh = self.run_consent_flow(&secrets).await?;
        store.save(&fresh)?;
        info!("stored new token at {}", store.path().display());
        Ok(fresh.access_token)
    }

    async fn refresh(&self, secrets: &ClientSecrets, refresh_token: &str) -> Result<StoredToken> {
        let response = self
            .request_token(&[
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        Ok(StoredToken::from_response(
            response,
            Some(refresh_token.to_string()),
        ))
    }

    async fn run_consent_flow(&self, secrets: &ClientSecrets) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind loopback listener for oauth redirect")?;
        let port = listener
            .local_addr()
            .context("read loopback listener address")?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");
        let state = Uuid::new_v4().simple().to_string();
        let url = consent_url(&secrets.client_id, &redirect_uri, self.scope, &state)?;

        println!("Open this URL in your browser to authorize mailtally:\n\n{url}\n");
        println!("Waiting for the authorization redirect on {redirect_uri} ...");

        let (mut stream, _) = listener
            .accept()
            .await
            .context("accept oauth redirect connection")?;
        let (reader, mut writer) = stream.split();
        let mut request_line = String::new();
        BufReader::new(reader)
            .read_line(&mut request_line)
            .await
            .context("read oauth redirect request")?;

        let outcome = parse_redirect_request(&request_line, &state);
        let page = if outcome.is_ok() {
            "Authorization complete. You can close this window."
        } else {
            "Authorization failed. Check the terminal for details."
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{page}",
            page.len()
        );
        if let Err(error) = writer.write_all(response.as_bytes()).await {
            warn!("failed to answer oauth redirect: {error}");
        }

        let code = outcome?;
        let response = self
            .request_token(&[
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        Ok(StoredToken::from_response(response, None))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<OAuthTokenResponse> {
        let token_url = &self.settings.token_url;
        let response = self
            .client
            .post(token_url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("request gmail oauth token from {token_url}"))?;

        let status = response.status();
        let body = response.text().await.context("read gmail token response")?;
        if !status.is_success() {
            return Err(anyhow!(
                "gmail oauth token request failed: status={} body={}",
                status,
                redact_response_body(&body)
            ));
        }

        serde_json::from_str(&body).context("decode gmail token JSON response")
    }
}

pub fn consent_url(
    client_id: &str,
    redirect_uri: &str,
    scope: GmailScope,
    state: &str,
) -> Result<Url> {
    Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.url()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .context("build oauth consent URL")
}

/// Pull the authorization code out of `GET /?code=..&state=.. HTTP/1.1`.
fn parse_redirect_request(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("malformed oauth redirect request: {request_line:?}"))?;
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .context("parse oauth redirect target")?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!("authorization was not granted: {error}");
    }
    if state.as_deref() != Some(expected_state) {
        bail!("oauth redirect state mismatch");
    }
    code.ok_or_else(|| anyhow!("oauth redirect carried no authorization code"))
}

pub(crate) fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        return trimmed.to_string();
    }

    let mut cut = REDACTED_BODY_MAX_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len())
}

fn encrypt_token(token: &StoredToken, key_bytes: &[u8; TOKEN_CACHE_KEY_BYTES]) -> Result<String> {
    let mut plaintext = serde_json::to_vec(token).context("serialize token payload")?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key_bytes)
        .map_err(|_| anyhow!("construct AES-256-GCM key"))?;
    let key = LessSafeKey::new(unbound_key);

    let mut nonce_bytes = [0u8; TOKEN_CACHE_NONCE_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| anyhow!("generate random nonce for token cache encryption"))?;

    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut plaintext,
    )
    .map_err(|_| anyhow!("encrypt token cache"))?;

    let envelope = EncryptedTokenEnvelope {
        version: TOKEN_CACHE_ENVELOPE_VERSION,
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(&plaintext),
    };
    serde_json::to_string(&envelope).context("serialize encrypted token envelope")
}

fn decrypt_token(raw: &str, key_bytes: &[u8; TOKEN_CACHE_KEY_BYTES]) -> Result<StoredToken> {
    let envelope: EncryptedTokenEnvelope =
        serde_json::from_str(raw).context("parse encrypted token envelope")?;
    if envelope.version != TOKEN_CACHE_ENVELOPE_VERSION {
        bail!("unsupported token envelope version {}", envelope.version);
    }

    let nonce_bytes: [u8; TOKEN_CACHE_NONCE_BYTES] = STANDARD
        .decode(&envelope.nonce)
        .context("decode envelope nonce")?
        .try_into()
        .map_err(|_| anyhow!("invalid nonce length in token envelope"))?;
    let mut ciphertext = STANDARD
        .decode(&envelope.ciphertext)
        .context("decode envelope ciphertext")?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key_bytes)
        .map_err(|_| anyhow!("construct AES-256-GCM key"))?;
    let key = LessSafeKey::new(unbound_key);
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| anyhow!("decrypt token cache"))?;

    serde_json::from_slice(plaintext).context("parse decrypted token payload")
}

fn parse_token_cache_key_hex(raw: &str) -> Result<[u8; TOKEN_CACHE_KEY_BYTES]> {
    let value = raw.trim();
    if value.len() != TOKEN_CACHE_KEY_BYTES * 2 {
        bail!("token cache key must be {} hex characters", TOKEN_CACHE_KEY_BYTES * 2);
    }

    let mut out = [0u8; TOKEN_CACHE_KEY_BYTES];
    for (idx, pair) in value.as_bytes().chunks(2).enumerate() {
        let hi = decode_hex_nibble(pair[0]).ok_or_else(|| anyhow!("invalid hex digit"))?;
        let lo = decode_hex_nibble(pair[1]).ok_or_else(|| anyhow!("invalid hex digit"))?;
        out[idx] = (hi << 4) | lo;
    }
    Ok(out)
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
