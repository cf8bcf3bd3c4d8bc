//! OAuth1 request signing (RFC 5849, HMAC-SHA1)
//!
//! Only signing of requests made with an already issued access token is
//! implemented here. Obtaining the token is the login flow's job.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::AppError;

type HmacSha1 = Hmac<Sha1>;

/// Consumer and access token pairs used to sign one request
#[derive(Clone, Copy)]
pub struct OAuthKeys<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: &'a str,
    pub token_secret: &'a str,
}

/// Percent-encode per RFC 3986 (unreserved characters kept)
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Scheme, host and path of `url`, lowercased where the RFC requires it
fn base_string_uri(url: &url::Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", scheme, host, port, url.path()),
        None => format!("{}://{}{}", scheme, host, url.path()),
    }
}

/// Build the signature base string
///
/// `params` must hold every query, form and `oauth_*` parameter except
/// `oauth_signature`.
pub fn signature_base_string(method: &str, url: &url::Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (encode(key), encode(value)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(url)),
        encode(&normalized)
    )
}

/// HMAC-SHA1 signature of a base string, base64 encoded
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> Result<String, AppError> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid HMAC key: {e}")))?;
    mac.update(base_string.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Build the `Authorization` header for a request
///
/// Query parameters of `url` and `extra_params` (form body) take part in
/// the signature.
pub fn authorization_header(
    method: &str,
    url: &url::Url,
    extra_params: &[(String, String)],
    keys: OAuthKeys<'_>,
    nonce: &str,
    timestamp: i64,
) -> Result<String, AppError> {
    let oauth_params = vec![
        ("oauth_consumer_key".to_string(), keys.consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), keys.token.to_string()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    params.extend(extra_params.iter().cloned());
    params.extend(oauth_params.iter().cloned());

    let base_string = signature_base_string(method, url, &params);
    let signature = sign(&base_string, keys.consumer_secret, keys.token_secret)?;

    let header = oauth_params
        .iter()
        .chain(std::iter::once(&("oauth_signature".to_string(), signature)))
        .map(|(key, value)| format!("{}=\"{}\"", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header))
}
