use crate::error::EncodingError;

/// Number of bytes `name` occupies on the wire.
///
/// Each dot becomes a length prefix, the first label gains one more and the
/// terminator adds the last byte.
pub fn encoding_length(name: &str) -> usize {
    if name == "." {
        return 1;
    }
    name.len() + 2
}

/// Encode a dotted name as length-prefixed labels followed by a zero byte.
pub fn encode(name: &str) -> Result<Vec<u8>, EncodingError> {
    let expected = encoding_length(name);
    let mut buf = Vec::with_capacity(expected);

    if name != "." {
        for label in name.split('.') {
            if label.is_empty() {
                return Err(EncodingError::EmptyLabel { name: name.to_string() });
            }
            let len = u8::try_from(label.len()).map_err(|_| EncodingError::LabelTooLong {
                label: label.to_string(),
                len: label.len(),
            })?;
            buf.push(len);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);

    if buf.len() != expected {
        return Err(EncodingError::Overflow { expected, actual: buf.len() });
    }
    Ok(buf)
}

/// Inverse of [`encode`], used to verify encoded records.
#[cfg(test)]
pub fn decode(buf: &[u8]) -> Option<String> {
    let mut labels = Vec::new();
    let mut offset = 0;
    loop {
        let len = *buf.get(offset)? as usize;
        offset += 1;
        if len == 0 {
            break;
        }
        let label = buf.get(offset..offset + len)?;
        labels.push(std::str::from_utf8(label).ok()?.to_string());
        offset += len;
    }
    if offset != buf.len() {
        return None;
    }
    if labels.is_empty() {
        return Some(".".to_string());
    }
    Some(labels.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_name() {
        assert_eq!(encode(".").unwrap(), vec![0]);
        assert_eq!(decode(&[0]).unwrap(), ".");
    }

    #[test]
    fn test_two_labels() {
        assert_eq!(encode("a.b").unwrap(), vec![1, b'a', 1, b'b', 0]);
    }

    #[test]
    fn test_length_matches_formula() {
        for name in ["node1.local", "x", "a.b.c.d.e", "grafana.monitoring.local"] {
            let encoded = encode(name).unwrap();
            assert_eq!(encoded.len(), name.len() + 2, "length mismatch for {}", name);
            assert_eq!(decode(&encoded).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_label_limit() {
        let max = "a".repeat(255);
        let encoded = encode(&format!("{}.local", max)).unwrap();
        assert_eq!(encoded[0], 255);
        assert_eq!(decode(&encoded).unwrap(), format!("{}.local", max));

        let too_long = format!("{}.local", "a".repeat(256));
        match encode(&too_long) {
            Err(EncodingError::LabelTooLong { len, .. }) => assert_eq!(len, 256),
            other => panic!("expected LabelTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_labels_rejected() {
        for name in ["a..b", "host.local.", ".local", ""] {
            assert!(
                matches!(encode(name), Err(EncodingError::EmptyLabel { .. })),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_multibyte_labels() {
        let name = "café.local";
        let encoded = encode(name).unwrap();
        assert_eq!(encoded[0] as usize, "café".len());
        assert_eq!(decode(&encoded).as_deref(), Some(name));
    }
}
