//! Per-call context derived from request metadata.

use std::time::{Duration, Instant};

use imagevault::CallContext;
use tonic::metadata::MetadataMap;

/// Builds the call context for a request, honoring the `grpc-timeout`
/// header when the client attached a deadline (clients conventionally send
/// a 5-second one).
pub(crate) fn call_context(metadata: &MetadataMap) -> CallContext {
    let timeout = metadata
        .get("grpc-timeout")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout);

    match timeout {
        Some(timeout) => CallContext::with_deadline(Instant::now() + timeout),
        None => CallContext::new(),
    }
}

/// Parses the wire form of a gRPC timeout: at most eight ASCII digits
/// followed by a unit (`H`, `M`, `S`, `m`, `u`, `n`).
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Some(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99n"), Some(Duration::from_nanos(99)));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("12"), None);
        assert_eq!(parse_grpc_timeout("-5S"), None);
        assert_eq!(parse_grpc_timeout("5X"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn metadata_without_timeout_yields_a_plain_context() {
        let ctx = call_context(&MetadataMap::new());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn zero_timeout_is_already_expired() {
        let mut metadata = MetadataMap::new();
        metadata.insert("grpc-timeout", "0n".parse().unwrap());

        let ctx = call_context(&metadata);
        assert!(ctx.check().is_err());
    }
}
