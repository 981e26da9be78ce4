//! Label key codec.
//!
//! Liveness registries are keyed by a single string that packs the ordered
//! label values of one time series. The separator wraps the `|:|` marker in
//! ASCII unit-separator control characters, which never occur in hostnames,
//! Kubernetes object names, domains, percentages, CJK project names or agent
//! comments. Single characters such as `_` or `-` are not usable here because
//! real label values contain them.

use tracing::warn;

pub const LABEL_SEPARATOR: &str = "\u{1f}|:|\u{1f}";

/// Whether `parts` can be packed into a key that decodes back to the same tuple.
pub fn is_encodable<S: AsRef<str>>(parts: &[S]) -> bool {
    parts.iter().all(|p| !p.as_ref().contains(LABEL_SEPARATOR))
}

/// Join label values into one opaque key.
///
/// Values containing [`LABEL_SEPARATOR`] do not round-trip; check
/// [`is_encodable`] first.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> String {
    let mut key = String::with_capacity(parts.iter().map(|p| p.as_ref().len() + 5).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push_str(LABEL_SEPARATOR);
        }
        key.push_str(part.as_ref());
    }
    key
}

/// Split a key back into exactly `arity` label values.
///
/// Any other part count means the key is corrupt; it is logged and `None` is
/// returned so the caller never acts on a partial tuple.
pub fn decode(key: &str, arity: usize) -> Option<Vec<String>> {
    let parts: Vec<String> = key.split(LABEL_SEPARATOR).map(str::to_string).collect();
    if parts.len() != arity {
        warn!(
            key = %key.replace(LABEL_SEPARATOR, "|"),
            expected = arity,
            found = parts.len(),
            "corrupt label key"
        );
        return None;
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_awkward_values() {
        let values = vec![
            "web_01.prod-east".to_string(),
            "支付中心".to_string(),
            "85.50%".to_string(),
            "".to_string(),
            "kube-system".to_string(),
        ];
        let key = encode(&values);
        assert_eq!(decode(&key, values.len()), Some(values));
    }

    #[test]
    fn test_underscores_do_not_split() {
        let key = encode(&["host_a_b", "svc_x"]);
        assert_eq!(
            decode(&key, 2),
            Some(vec!["host_a_b".to_string(), "svc_x".to_string()])
        );
    }

    #[test]
    fn test_wrong_arity_is_corrupt() {
        let key = encode(&["a", "b"]);
        assert_eq!(decode(&key, 3), None);
        assert_eq!(decode(&key, 1), None);
        assert_eq!(decode("legacy_key_format", 2), None);
    }

    #[test]
    fn test_embedded_separator_is_not_encodable() {
        let hostile = format!("edge{LABEL_SEPARATOR}1");
        assert!(!is_encodable(&[hostile.as_str(), "shop"]));
        assert!(is_encodable(&["edge|:|1", "shop\u{1f}"]));
        assert_eq!(decode(&encode(&[hostile.as_str(), "shop"]), 2), None);
    }

    #[test]
    fn test_single_value() {
        assert_eq!(decode(&encode(&["only"]), 1), Some(vec!["only".to_string()]));
    }
}
