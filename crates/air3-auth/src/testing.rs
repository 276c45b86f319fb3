//! Test helpers: ES384 key pairs that can sign tokens and publish a JWK.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p384::SecretKey;
use p384::ecdsa::SigningKey;
use p384::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde_json::{Value, json};

pub(crate) struct TestKey {
    pub kid: String,
    encoding_key: EncodingKey,
    x: String,
    y: String,
}

impl TestKey {
    pub fn generate(kid: &str) -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        let signing_key = SigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = URL_SAFE_NO_PAD.encode(point.x().unwrap().as_slice());
        let y = URL_SAFE_NO_PAD.encode(point.y().unwrap().as_slice());

        let private_pem = secret_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap();

        Self {
            kid: kid.to_string(),
            encoding_key,
            x,
            y,
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "crv": "P-384",
            "alg": "ES384",
            "use": "sig",
            "kid": self.kid,
            "x": self.x,
            "y": self.y,
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES384);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).unwrap()
    }

    /// Signs without a `kid` header.
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        let header = Header::new(Algorithm::ES384);
        jsonwebtoken::encode(&header, claims, &self.encoding_key).unwrap()
    }
}

pub(crate) fn jwks_body(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Builds an unsigned-looking token with an arbitrary payload, as the
/// decode-only path only reads the middle segment.
pub(crate) fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
