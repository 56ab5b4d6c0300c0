//! JWT bearer authentication.
//!
//! Key sources, in priority order: remote JWKS URL, inline HMAC secret,
//! static JWKS document, inline RSA public key (PEM). Verification errors
//! surface as 401; key-resolution configuration errors as 500.

use async_trait::async_trait;
use http::StatusCode;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::expr::{self, Expr};
use super::jwks::{parse_jwks, JwkEntry};
use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Middleware, Next};

type ClaimsValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Where to read the token from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenLookup {
    /// `header:<Name>`; the `Authorization` header strips a `Bearer ` prefix.
    Header(String),
    /// `query:<name>`
    Query(String),
    /// `cookie:<name>`
    Cookie(String),
}

impl TokenLookup {
    fn parse(directive: &str) -> Result<Self, Error> {
        let (kind, name) = directive
            .split_once(':')
            .ok_or_else(|| Error::config(format!("invalid token lookup {directive:?}")))?;
        let name = name.trim().to_string();
        match kind.trim() {
            "header" => Ok(TokenLookup::Header(name)),
            "query" => Ok(TokenLookup::Query(name)),
            "cookie" => Ok(TokenLookup::Cookie(name)),
            other => Err(Error::config(format!("invalid token lookup source {other:?}"))),
        }
    }
}

enum KeyStore {
    Remote {
        url: String,
        client: reqwest::Client,
        ttl: Duration,
        cache: RwLock<Option<(Instant, Arc<HashMap<String, JwkEntry>>)>>,
    },
    Secret(DecodingKey),
    Static(HashMap<String, JwkEntry>),
    RsaPem(DecodingKey),
}

/// Builder for [`JwtAuth`]. Fails fast: expression parse errors, malformed
/// keys and bad lookup directives are reported by [`JwtAuthBuilder::build`],
/// not per request.
pub struct JwtAuthBuilder {
    token_lookup: String,
    jwks_url: Option<String>,
    secret: Option<Vec<u8>>,
    jwks_document: Option<String>,
    rsa_pem: Option<Vec<u8>>,
    audience: Option<String>,
    issuer: Option<String>,
    algorithms: Vec<Algorithm>,
    leeway: u64,
    jwks_ttl: Duration,
    claims_expression: Option<String>,
    validate_claims: Option<ClaimsValidator>,
    forward_claims: Vec<(String, String)>,
    context_key: Option<String>,
    failure_status: StatusCode,
}

impl JwtAuthBuilder {
    pub fn token_lookup(mut self, directive: impl Into<String>) -> Self {
        self.token_lookup = directive.into();
        self
    }

    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn jwks_document(mut self, document: impl Into<String>) -> Self {
        self.jwks_document = Some(document.into());
        self
    }

    pub fn rsa_public_key_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.rsa_pem = Some(pem.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Restrict accepted algorithms. Empty means "whatever the key supports".
    pub fn algorithms(mut self, algorithms: &[Algorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    pub fn leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    pub fn jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    pub fn claims_expression(mut self, expression: impl Into<String>) -> Self {
        self.claims_expression = Some(expression.into());
        self
    }

    pub fn validate_claims<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validate_claims = Some(Arc::new(f));
        self
    }

    /// Forward a claim (dot-path) into the context store under `key`.
    /// Array claims are joined with commas.
    pub fn forward_claim(mut self, claim_path: impl Into<String>, key: impl Into<String>) -> Self {
        self.forward_claims.push((claim_path.into(), key.into()));
        self
    }

    /// Store the full claims map under this context key.
    pub fn context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }

    /// Status for authorization (claims) failures; authentication failures
    /// are always 401.
    pub fn failure_status(mut self, status: StatusCode) -> Self {
        self.failure_status = status;
        self
    }

    pub fn build(self) -> Result<JwtAuth, Error> {
        let lookup = TokenLookup::parse(&self.token_lookup)?;

        let expression = match &self.claims_expression {
            Some(source) => Some(expr::parse(source)?),
            None => None,
        };

        let keys = if let Some(url) = self.jwks_url {
            KeyStore::Remote {
                url,
                client: reqwest::Client::new(),
                ttl: self.jwks_ttl,
                cache: RwLock::new(None),
            }
        } else if let Some(secret) = self.secret {
            KeyStore::Secret(DecodingKey::from_secret(&secret))
        } else if let Some(document) = self.jwks_document {
            KeyStore::Static(parse_jwks(&document)?)
        } else if let Some(pem) = self.rsa_pem {
            KeyStore::RsaPem(
                DecodingKey::from_rsa_pem(&pem)
                    .map_err(|e| Error::config(format!("invalid RSA public key: {e}")))?,
            )
        } else {
            return Err(Error::config("JWT auth requires a key source"));
        };

        Ok(JwtAuth {
            lookup,
            keys,
            audience: self.audience,
            issuer: self.issuer,
            algorithms: self.algorithms,
            leeway: self.leeway,
            expression,
            validate_claims: self.validate_claims,
            forward_claims: self.forward_claims,
            context_key: self.context_key,
            failure_status: self.failure_status,
        })
    }
}

/// The JWT verification middleware. Construct with [`JwtAuth::builder`].
pub struct JwtAuth {
    lookup: TokenLookup,
    keys: KeyStore,
    audience: Option<String>,
    issuer: Option<String>,
    algorithms: Vec<Algorithm>,
    leeway: u64,
    expression: Option<Expr>,
    validate_claims: Option<ClaimsValidator>,
    forward_claims: Vec<(String, String)>,
    context_key: Option<String>,
    failure_status: StatusCode,
}

impl JwtAuth {
    pub fn builder() -> JwtAuthBuilder {
        JwtAuthBuilder {
            token_lookup: "header:Authorization".to_string(),
            jwks_url: None,
            secret: None,
            jwks_document: None,
            rsa_pem: None,
            audience: None,
            issuer: None,
            algorithms: Vec::new(),
            leeway: 30,
            jwks_ttl: Duration::from_secs(300),
            claims_expression: None,
            validate_claims: None,
            forward_claims: Vec::new(),
            context_key: None,
            failure_status: StatusCode::UNAUTHORIZED,
        }
    }

    fn extract_token(&self, ctx: &Context) -> Option<String> {
        match &self.lookup {
            TokenLookup::Header(name) => {
                let value = ctx.header(name)?;
                if name.eq_ignore_ascii_case("authorization") {
                    value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
                } else {
                    Some(value.trim().to_string())
                }
            }
            TokenLookup::Query(name) => ctx.query(name),
            TokenLookup::Cookie(name) => ctx.cookie(name),
        }
    }

    /// Resolve the decoding key and the algorithms it may verify.
    async fn resolve_key(
        &self,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<(DecodingKey, Vec<Algorithm>), Error> {
        match &self.keys {
            KeyStore::Secret(key) => Ok((
                key.clone(),
                vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            )),
            KeyStore::RsaPem(key) => Ok((
                key.clone(),
                vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
            )),
            KeyStore::Static(keys) => pick_from_set(keys, kid)
                .ok_or_else(|| Error::Auth(format!("no JWKS key for kid {kid:?}"))),
            KeyStore::Remote { url, client, ttl, cache } => {
                if let Some((fetched_at, keys)) = cache.read().await.clone() {
                    if fetched_at.elapsed() < *ttl {
                        if let Some(entry) = pick_from_set(&keys, kid) {
                            return Ok(entry);
                        }
                    }
                }

                // unknown kid or stale cache: refresh
                let body = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| Error::config(format!("JWKS fetch {url}: {e}")))?
                    .text()
                    .await
                    .map_err(|e| Error::config(format!("JWKS fetch {url}: {e}")))?;
                let keys = Arc::new(parse_jwks(&body)?);
                *cache.write().await = Some((Instant::now(), Arc::clone(&keys)));

                pick_from_set(&keys, kid)
                    .ok_or_else(|| Error::Auth(format!("no JWKS key for kid {kid:?} (alg {alg:?})")))
            }
        }
    }

    fn authorize(&self, claims: &Value) -> Result<(), Error> {
        if let Some(expression) = &self.expression {
            if !expression.evaluate(claims) {
                return Err(Error::Claims("claims expression rejected the token".to_string()));
            }
        }
        if let Some(validator) = &self.validate_claims {
            validator(claims).map_err(Error::Claims)?;
        }
        Ok(())
    }

    fn forward(&self, ctx: &Context, claims: &Value) {
        for (path, key) in &self.forward_claims {
            let Some(value) = lookup_claim(claims, path) else {
                continue;
            };
            let text = match value {
                Value::Array(items) => items
                    .iter()
                    .map(claim_text)
                    .collect::<Vec<_>>()
                    .join(","),
                other => claim_text(other),
            };
            ctx.set(key.clone(), text);
        }
        if let Some(key) = &self.context_key {
            ctx.set(key.clone(), claims.clone());
        }
    }
}

#[async_trait]
impl Middleware for JwtAuth {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let Some(token) = self.extract_token(&ctx) else {
            debug!("jwt auth: missing token");
            ctx.abort_with_error(StatusCode::UNAUTHORIZED, "missing token");
            return Ok(());
        };

        let header = match decode_header(&token) {
            Ok(header) => header,
            Err(e) => {
                debug!("jwt auth: malformed token: {e}");
                ctx.abort_with_error(StatusCode::UNAUTHORIZED, "malformed token");
                return Ok(());
            }
        };

        let (key, key_algorithms) = match self.resolve_key(header.kid.as_deref(), header.alg).await
        {
            Ok(resolved) => resolved,
            Err(Error::Auth(reason)) => {
                debug!("jwt auth: {reason}");
                ctx.abort_with_error(StatusCode::UNAUTHORIZED, reason);
                return Ok(());
            }
            Err(config_error) => {
                warn!("jwt auth configuration error: {config_error}");
                ctx.abort_with_error(StatusCode::INTERNAL_SERVER_ERROR, config_error.to_string());
                return Ok(());
            }
        };

        let allowed = if self.algorithms.is_empty() { &key_algorithms } else { &self.algorithms };
        if !allowed.contains(&header.alg) {
            debug!("jwt auth: algorithm {:?} not allowed", header.alg);
            ctx.abort_with_error(StatusCode::UNAUTHORIZED, "algorithm not allowed");
            return Ok(());
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.required_spec_claims.clear();
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let claims = match decode::<Value>(&token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!("jwt auth: verification failed: {e}");
                ctx.abort_with_error(StatusCode::UNAUTHORIZED, format!("invalid token: {e}"));
                return Ok(());
            }
        };

        if let Err(e) = self.authorize(&claims) {
            debug!("jwt auth: {e}");
            ctx.abort_with_error(self.failure_status, e.to_string());
            return Ok(());
        }

        self.forward(&ctx, &claims);
        next.run(ctx).await
    }
}

fn pick_from_set(
    keys: &HashMap<String, JwkEntry>,
    kid: Option<&str>,
) -> Option<(DecodingKey, Vec<Algorithm>)> {
    let entry = match kid {
        Some(kid) => keys.get(kid),
        // tokens without a kid are acceptable against a single-key set
        None if keys.len() == 1 => keys.values().next(),
        None => None,
    }?;
    Some((entry.key.clone(), entry.algorithms.clone()))
}

fn lookup_claim<'a>(claims: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = claims;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn claim_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
