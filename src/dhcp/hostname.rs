//! Hostname option encoding passed to the DHCP client binaries.
//!
//! The upstream client's own FQDN-option encoding is known-broken (it
//! mis-sizes the label length prefix), so the supervisor builds the raw
//! option string itself and passes it straight through as an extra client
//! argument rather than relying on the client's `-F`/hostname convenience
//! flag.

/// DHCPv4 option 12 ("Host Name"), passed as `hostname:<value>`.
pub fn encode_v4(hostname: &str) -> String {
    format!("hostname:{hostname}")
}

/// DHCPv6 option 39 (OPTION_FQDN): flags byte with the S-bit set (server
/// should perform the AAAA update), followed by the FQDN encoded as a
/// sequence of length-prefixed UTF-8 labels with no trailing root label.
pub fn encode_v6(hostname: &str) -> Vec<u8> {
    const FLAG_S: u8 = 0x01;

    let mut out = vec![FLAG_S];
    for label in hostname.split('.') {
        if label.is_empty() {
            continue;
        }
        let bytes = label.as_bytes();
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_option_wraps_hostname_with_prefix() {
        assert_eq!(encode_v4("web-1"), "hostname:web-1");
    }

    #[test]
    fn v6_option_sets_s_bit_and_length_prefixes_labels() {
        let encoded = encode_v6("web-1.example.com");
        assert_eq!(encoded[0], 0x01);
        assert_eq!(encoded[1], b"web-1".len() as u8);
        assert_eq!(&encoded[2..2 + 5], b"web-1");
    }

    #[test]
    fn v6_option_skips_empty_labels_from_trailing_dot() {
        let encoded = encode_v6("host.");
        // "host" label (1 + 4 bytes) plus the leading flag byte, no trailing
        // zero-length label for the elided root.
        assert_eq!(encoded.len(), 1 + 1 + 4);
    }
}
