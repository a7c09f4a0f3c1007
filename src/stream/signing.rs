//! AWS Signature Version 4 helpers that attach `Authorization` and
//! `X-Amz-Date` headers to stream service requests. Local emulators accept
//! any credentials but still expect a well-formed signature.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "kinesis";
const SIGNED_HEADERS: &str = "content-type;host;x-amz-date;x-amz-target";
pub(crate) const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";

/// Everything that identifies one signed request.
pub(crate) struct SigningRequest<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub host: &'a str,
    pub target: &'a str,
    pub body: &'a [u8],
}

pub(crate) fn build_signed_headers(
    request: &SigningRequest<'_>,
    now: DateTime<Utc>,
) -> Result<HeaderMap> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let signature = sign(request, &amz_date, &date_stamp)?;
    let scope = credential_scope(&date_stamp, request.region);
    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        request.access_key_id
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    headers.insert(
        "x-amz-target",
        HeaderValue::from_str(request.target).context("invalid X-Amz-Target header")?,
    );
    headers.insert(
        "x-amz-date",
        HeaderValue::from_str(&amz_date).context("invalid X-Amz-Date header")?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&authorization).context("failed to build Authorization header")?,
    );
    Ok(headers)
}

fn sign(request: &SigningRequest<'_>, amz_date: &str, date_stamp: &str) -> Result<String> {
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{CONTENT_TYPE_JSON}\nhost:{}\nx-amz-date:{amz_date}\nx-amz-target:{}\n\n{SIGNED_HEADERS}\n{}",
        request.host,
        request.target,
        sha256_hex(request.body),
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{}\n{}",
        credential_scope(date_stamp, request.region),
        sha256_hex(canonical_request.as_bytes()),
    );

    let key = derive_signing_key(request.secret_access_key, date_stamp, request.region, SERVICE)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

fn credential_scope(date_stamp: &str, region: &str) -> String {
    format!("{date_stamp}/{region}/{SERVICE}/aws4_request")
}

fn derive_signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|err| anyhow!("invalid signing key: {err}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
