//! Remote Lua source intake over HTTP.

use crate::encoding;
use crate::errors::{CoreError, Result};

/// Response statuses accepted for source downloads.
const ACCEPTED_STATUS: [u16; 4] = [200, 204, 301, 302];

/// Fetches Lua source from a URL. The advertised content length and the
/// actual body are both capped at `limit` bytes; the body is decoded with
/// the same BOM-sniffing chain used for uploads.
pub async fn fetch_lua_source(client: &reqwest::Client, url: &str, limit: u64) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| CoreError::UrlRejected(format!("invalid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::UrlRejected(
            "only http and https URLs are accepted".into(),
        ));
    }

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|err| CoreError::UrlRejected(format!("URL not reachable: {err}")))?;

    let status = response.status().as_u16();
    if !ACCEPTED_STATUS.contains(&status) {
        return Err(CoreError::UrlRejected(format!("HTTP error: {status}")));
    }

    if let Some(length) = response.content_length() {
        if length > limit {
            return Err(CoreError::SourceTooLarge {
                size: length,
                limit,
            });
        }
    }

    let body = response.bytes().await?;
    if body.len() as u64 > limit {
        return Err(CoreError::SourceTooLarge {
            size: body.len() as u64,
            limit,
        });
    }

    Ok(encoding::decode_lua_bytes(&body))
}
