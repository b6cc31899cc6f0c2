use axum::http::HeaderMap;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
}

pub fn build_context(headers: &HeaderMap) -> RequestContext {
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id);

    RequestContext { correlation_id }
}

pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reuses_inbound_correlation_id() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("corr-abc"));
        let ctx = build_context(&headers);
        assert_eq!(ctx.correlation_id, "corr-abc");
    }

    #[test]
    fn generates_one_when_missing_or_blank() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("  "));
        let ctx = build_context(&headers);
        assert!(uuid::Uuid::parse_str(&ctx.correlation_id).is_ok());
    }
}
