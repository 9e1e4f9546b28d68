use crate::BencodeType;

/// Encode [`BencodeType`] to its canonical byte form
///
/// Dict keys are emitted in ascending byte order, so equal values always produce identical
/// output regardless of how the dict was built.
pub fn encode(data: &BencodeType) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(data, &mut buf);
    buf
}

fn encode_into(data: &BencodeType, buf: &mut Vec<u8>) {
    match data {
        BencodeType::Integer(int) => {
            buf.push(b'i');
            buf.extend_from_slice(int.to_string().as_bytes());
            buf.push(b'e');
        }
        BencodeType::ByteString(bytes) => encode_byte_string(bytes, buf),
        BencodeType::List(items) => {
            buf.push(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.push(b'e');
        }
        BencodeType::Dict(dict) => {
            let mut pairs = dict.iter().collect::<Vec<_>>();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            buf.push(b'd');
            for (key, value) in pairs {
                encode_byte_string(key, buf);
                encode_into(value, buf);
            }
            buf.push(b'e');
        }
    }
}

fn encode_byte_string(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn encode_integer() {
        let integer = 42;
        let data = BencodeType::Integer(integer);
        let expected_output = format!("i{}e", integer);
        assert_eq!(encode(&data), expected_output.as_bytes());
    }

    #[test]
    fn encode_zero_and_negative_integers() {
        assert_eq!(encode(&BencodeType::Integer(0)), b"i0e");
        assert_eq!(encode(&BencodeType::Integer(-10)), b"i-10e");
    }

    #[test]
    fn encode_byte_string() {
        let string = "hello";
        let data = BencodeType::from(string);
        let expected_output = format!("{}:{}", string.len(), string);
        assert_eq!(encode(&data), expected_output.as_bytes());
    }

    #[test]
    fn encode_binary_byte_string_uses_byte_length() {
        let data = BencodeType::ByteString(vec![0xc3, 0xa9, 0x00]);
        assert_eq!(encode(&data), b"3:\xc3\xa9\x00");
    }

    #[test]
    fn encode_list() {
        let integer = 42;
        let string = "hello";
        let data = BencodeType::List(vec![
            BencodeType::Integer(integer),
            BencodeType::from(string),
        ]);
        let expected_output = format!("li{}e{}:{}e", integer, string.len(), string);
        assert_eq!(encode(&data), expected_output.as_bytes());
    }

    #[test]
    fn encode_dict() {
        let key1 = "comment";
        let value1 = "Description of contents";
        let key2 = "creation date";
        let value2 = 1234567890;
        let mut map = HashMap::new();
        map.insert(key2.as_bytes().to_vec(), BencodeType::Integer(value2));
        map.insert(key1.as_bytes().to_vec(), BencodeType::from(value1));
        let data = BencodeType::Dict(map);
        let expected_output = format!(
            "d{}:{}{}:{}{}:{}i{}ee",
            key1.len(),
            key1,
            value1.len(),
            value1,
            key2.len(),
            key2,
            value2,
        );
        assert_eq!(encode(&data), expected_output.as_bytes());
    }

    #[test]
    fn dict_keys_sorted_by_raw_bytes_regardless_of_insertion_order() {
        let keys: [&[u8]; 5] = [b"zeta", b"a", b"\xff", b"B", b"ab"];
        let forward = keys
            .iter()
            .map(|key| (key.to_vec(), BencodeType::Integer(1)))
            .collect::<HashMap<_, _>>();
        let backward = keys
            .iter()
            .rev()
            .map(|key| (key.to_vec(), BencodeType::Integer(1)))
            .collect::<HashMap<_, _>>();
        let expected = b"d1:Bi1e1:ai1e2:abi1e4:zetai1e1:\xffi1ee".to_vec();
        assert_eq!(encode(&BencodeType::Dict(forward)), expected);
        assert_eq!(encode(&BencodeType::Dict(backward)), expected);
    }

    #[test]
    fn encoding_is_idempotent() {
        let data = crate::decode::decode(b"d4:spaml1:a1:be3:cow3:mooe").unwrap();
        let once = encode(&data);
        let twice = encode(&crate::decode::decode(&once).unwrap());
        assert_eq!(once, twice);
        assert_eq!(once, b"d3:cow3:moo4:spaml1:a1:bee");
    }
}
