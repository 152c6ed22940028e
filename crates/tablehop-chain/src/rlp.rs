//! Minimal RLP encoder, enough for legacy transactions

/// Encode a byte string
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }
    let mut out = encode_length(bytes.len(), 0x80);
    out.extend_from_slice(bytes);
    out
}

/// Encode a big-endian unsigned integer with leading zeros stripped
pub fn encode_uint_be(be_bytes: &[u8]) -> Vec<u8> {
    let first = be_bytes.iter().position(|b| *b != 0).unwrap_or(be_bytes.len());
    encode_bytes(&be_bytes[first..])
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    encode_uint_be(&value.to_be_bytes())
}

pub fn encode_u128(value: u128) -> Vec<u8> {
    encode_uint_be(&value.to_be_bytes())
}

/// Encode a list from already-encoded items
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = encode_length(payload_len, 0xc0);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn encode_length(len: usize, offset: u8) -> Vec<u8> {
    if len <= 55 {
        return vec![offset + len as u8];
    }
    let be = (len as u64).to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
    let len_bytes = &be[first..];
    let mut out = Vec::with_capacity(1 + len_bytes.len());
    out.push(offset + 55 + len_bytes.len() as u8);
    out.extend_from_slice(len_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string() {
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
    }

    #[test]
    fn test_empty_string_and_zero() {
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_u64(0), vec![0x80]);
    }

    #[test]
    fn test_small_integers() {
        assert_eq!(encode_u64(15), vec![0x0f]);
        assert_eq!(encode_u64(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(encode_u128(0x80), vec![0x81, 0x80]);
    }

    #[test]
    fn test_list() {
        let list = encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]);
        assert_eq!(
            list,
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(encode_list(&[]), vec![0xc0]);
    }

    #[test]
    fn test_long_string() {
        let data = vec![b'a'; 56];
        let encoded = encode_bytes(&data);
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(encoded.len(), 58);
    }
}
