use std::collections::HashMap;
use std::time::Duration;

/// Reads the wait hint a throttled backend attached to its response.
///
/// `retry-after-ms` takes precedence over `retry-after`. Both accept fractional
/// numbers; HTTP-date values are ignored.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    header(headers, "retry-after-ms")
        .and_then(|millis| parse_positive(millis).map(|millis| millis / 1000.0))
        .or_else(|| header(headers, "retry-after").and_then(parse_positive))
        .map(Duration::from_secs_f64)
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn parse_positive(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_seconds_case_insensitively() {
        assert_eq!(
            retry_after_from_headers(&headers(&[("Retry-After", " 3 ")])),
            Some(Duration::from_secs(3))
        );
        assert_eq!(
            retry_after_from_headers(&headers(&[("retry-after", "0.5")])),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn milliseconds_header_wins() {
        let hint = retry_after_from_headers(&headers(&[
            ("retry-after", "20"),
            ("retry-after-ms", "1500"),
        ]));
        assert_eq!(hint, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn dates_and_garbage_are_ignored() {
        assert_eq!(
            retry_after_from_headers(&headers(&[("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT")])),
            None
        );
        assert_eq!(retry_after_from_headers(&headers(&[("retry-after", "-1")])), None);
        assert_eq!(retry_after_from_headers(&HashMap::new()), None);
    }
}
