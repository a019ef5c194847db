use jsonwebtoken::{jwk, jwk::AlgorithmParameters, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;

use super::OpenIDError;

pub type Keys = HashMap<String, DecodingKey>;

#[derive(Deserialize)]
struct Oid {
    jwks_uri: String,
}

/// Follows the discovery document at `uri` to its JWK set and returns the
/// usable signing keys by key id.
pub async fn decoding_keys(client: &reqwest::Client, uri: &str) -> Result<Keys, OpenIDError> {
    let jwks_uri = client
        .get(uri)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(OpenIDError::InvalidWellKnownUri)?
        .json::<Oid>()
        .await
        .map_err(OpenIDError::MissingOpenIDConfiguration)?
        .jwks_uri;
    let jwks = client
        .get(&jwks_uri)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(OpenIDError::InvalidJwksUri)?
        .json::<jwk::JwkSet>()
        .await
        .map_err(OpenIDError::MissingJwksSet)?;

    let keys = jwks_to_decoding_keys(&jwks);
    if keys.is_empty() {
        return Err(OpenIDError::NoUsableKeys(jwks_uri));
    }
    tracing::debug!("loaded {} signing keys from {}", keys.len(), jwks_uri);
    Ok(keys)
}

pub fn jwks_to_decoding_keys(jwks: &jwk::JwkSet) -> Keys {
    let mut hm = HashMap::new();
    for jwk in &jwks.keys {
        if let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm {
            if let Ok(decoding_key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                if let Some(kid) = jwk.common.key_id.clone() {
                    hm.insert(kid, decoding_key);
                }
            }
        }
    }
    hm
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rsa_keys_are_indexed_by_kid() {
        let jwks: jwk::JwkSet =
            serde_json::from_str(include_str!("../../tests/fixtures/jwks.json")).unwrap();
        let keys = jwks_to_decoding_keys(&jwks);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("test-key-1"));
    }

    #[test]
    fn keys_without_kid_or_of_other_types_are_skipped() {
        let fixture: serde_json::Value =
            serde_json::from_str(include_str!("../../tests/fixtures/jwks.json")).unwrap();
        let rsa = &fixture["keys"][0];
        let jwks: jwk::JwkSet = serde_json::from_value(json!({
            "keys": [
                { "kty": "RSA", "n": rsa["n"], "e": rsa["e"] },
                {
                    "kty": "EC",
                    "kid": "ec-key",
                    "crv": "P-256",
                    "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                    "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
                }
            ]
        }))
        .unwrap();
        assert!(jwks_to_decoding_keys(&jwks).is_empty());
    }
}
