use actix_web::HttpRequest;

use crate::model::device::DeviceMetadata;

pub mod attendance;
pub mod device;
pub mod hr_request;

/// Fills the request-derived part of device metadata. Forwarding headers are
/// only honoured when a trusted proxy sits in front of the service.
pub(crate) fn with_request_context(
    mut meta: DeviceMetadata,
    req: &HttpRequest,
    trust_proxy_headers: bool,
) -> DeviceMetadata {
    meta.ip = if trust_proxy_headers {
        req.connection_info().realip_remote_addr().map(str::to_owned)
    } else {
        req.peer_addr().map(|addr| addr.ip().to_string())
    };
    meta.user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn forwarded_request() -> HttpRequest {
        TestRequest::default()
            .peer_addr("198.51.100.7:54321".parse().unwrap())
            .insert_header(("User-Agent", "curl/8.0"))
            .insert_header(("X-Forwarded-For", "203.0.113.9"))
            .to_http_request()
    }

    #[test]
    fn request_context_uses_socket_peer_by_default() {
        let meta = with_request_context(DeviceMetadata::default(), &forwarded_request(), false);
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(meta.ip.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn forwarded_address_is_used_behind_trusted_proxy() {
        let meta = with_request_context(DeviceMetadata::default(), &forwarded_request(), true);
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
    }
}
