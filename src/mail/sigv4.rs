//! AWS Signature Version 4 request signing

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Static AWS credentials
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"***")
            .field("session_token", &self.session_token.is_some())
            .finish()
    }
}

/// The parts of a request that go into its signature
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub body: &'a [u8],
    /// `YYYYMMDD'T'HHMMSS'Z'`
    pub datetime: &'a str,
}

impl AwsCredentials {
    /// Headers to attach to the request, `authorization` included.
    pub fn sign(&self, request: &SigningRequest<'_>) -> Vec<(String, String)> {
        let date = &request.datetime[..8.min(request.datetime.len())];
        let payload_hash = hex_sha256(request.body);

        let mut signed_header_names = vec!["host", "x-amz-content-sha256", "x-amz-date"];
        if self.session_token.is_some() {
            signed_header_names.push("x-amz-security-token");
        }
        signed_header_names.sort();

        let mut canonical_headers = String::new();
        for name in &signed_header_names {
            let value = match *name {
                "host" => request.host,
                "x-amz-content-sha256" => payload_hash.as_str(),
                "x-amz-date" => request.datetime,
                "x-amz-security-token" => self.session_token.as_deref().unwrap_or(""),
                _ => "",
            };
            canonical_headers.push_str(&format!("{}:{}\n", name, value));
        }

        let signed_headers = signed_header_names.join(";");

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            request.method, request.path, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date, request.region, request.service
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            request.datetime,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.secret_access_key,
            date,
            request.region,
            request.service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, credential_scope, signed_headers, signature
        );

        let mut headers = vec![
            ("host".to_string(), request.host.to_string()),
            ("x-amz-date".to_string(), request.datetime.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash),
            ("authorization".to_string(), authorization),
        ];

        if let Some(ref token) = self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        headers
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

///   kDate    = HMAC("AWS4" + secret, date)
///   kRegion  = HMAC(kDate, region)
///   kService = HMAC(kRegion, service)
///   kSigning = HMAC(kService, "aws4_request")
fn derive_signing_key(secret_access_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{}", secret_access_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}
