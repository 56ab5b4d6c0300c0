//! JSON Web Key Set parsing.
//!
//! Accepts the standard `{"keys": [...]}` document with RSA (`n`, `e`) and
//! EC (`crv`, `x`, `y`) members, base64url-encoded without padding. Keys are
//! indexed by `kid`.

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::error::Error;

pub(crate) struct JwkEntry {
    pub key: DecodingKey,
    /// Algorithms this key can verify, used when no whitelist is configured.
    pub algorithms: Vec<Algorithm>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

/// Parse a JWKS document into kid-indexed decoding keys.
///
/// Unusable members (unknown `kty`, unsupported curve, malformed material)
/// are skipped with a warning; an empty result is a configuration error.
pub(crate) fn parse_jwks(document: &str) -> Result<HashMap<String, JwkEntry>, Error> {
    let document: JwksDocument = serde_json::from_str(document)
        .map_err(|e| Error::config(format!("invalid JWKS document: {e}")))?;

    let mut keys = HashMap::new();
    for (index, jwk) in document.keys.iter().enumerate() {
        let kid = jwk.kid.clone().unwrap_or_else(|| format!("key-{index}"));
        match build_entry(jwk) {
            Ok(entry) => {
                keys.insert(kid, entry);
            }
            Err(reason) => warn!(kid = %kid, %reason, "skipping unusable JWKS member"),
        }
    }

    if keys.is_empty() {
        return Err(Error::config("JWKS document contains no usable keys"));
    }
    Ok(keys)
}

fn build_entry(jwk: &Jwk) -> Result<JwkEntry, String> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or("RSA key missing n")?;
            let e = jwk.e.as_deref().ok_or("RSA key missing e")?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| format!("bad RSA components: {e}"))?;
            Ok(JwkEntry {
                key,
                algorithms: vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
            })
        }
        "EC" => {
            let crv = jwk.crv.as_deref().ok_or("EC key missing crv")?;
            let x = jwk.x.as_deref().ok_or("EC key missing x")?;
            let y = jwk.y.as_deref().ok_or("EC key missing y")?;
            let algorithm = match crv {
                "P-256" => Algorithm::ES256,
                "P-384" => Algorithm::ES384,
                // jsonwebtoken has no ES512 support
                "P-521" => return Err("curve P-521 is not supported".to_string()),
                other => return Err(format!("unsupported curve {other}")),
            };
            let key = DecodingKey::from_ec_components(x, y)
                .map_err(|e| format!("bad EC components: {e}"))?;
            Ok(JwkEntry { key, algorithms: vec![algorithm] })
        }
        other => Err(format!("unsupported kty {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7517 appendix A.1 example keys (public parts only)
    const DOCUMENT: &str = r#"{
        "keys": [
            {
                "kty": "EC",
                "crv": "P-256",
                "x": "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
                "y": "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
                "kid": "1"
            },
            {
                "kty": "RSA",
                "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                "e": "AQAB",
                "kid": "2011-04-29"
            }
        ]
    }"#;

    #[test]
    fn parses_rsa_and_ec_members() {
        let keys = parse_jwks(DOCUMENT).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys["1"].algorithms, vec![Algorithm::ES256]);
        assert_eq!(
            keys["2011-04-29"].algorithms,
            vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512]
        );
    }

    #[test]
    fn empty_or_garbage_documents_are_config_errors() {
        assert!(parse_jwks("{").is_err());
        assert!(parse_jwks(r#"{"keys": []}"#).is_err());
        assert!(parse_jwks(r#"{"keys": [{"kty": "OKP"}]}"#).is_err());
    }
}
