//! RFC 1071 Internet checksum
//!
//! A single implementation shared by the IPv4 header codec and the TCP/UDP
//! codecs; callers only differ in which pseudo-header they prefix.

/// One's-complement checksum over `data`.
///
/// The buffer is read as big-endian 16-bit words, a trailing odd byte is
/// padded with zero, carries are folded back until the sum fits in 16 bits
/// and the complement is returned.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    for chunk in data.chunks(2) {
        let word = match *chunk {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => unreachable!("chunks(2) yields one or two bytes"),
        };
        sum = sum.wrapping_add(u32::from(word));
        // Fold eagerly so arbitrarily large buffers cannot overflow the accumulator.
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// True when `data` (checksum field included) sums to zero.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1071_example() {
        // Worked example from RFC 1071 section 3: sum is 0xddf2.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_odd_length_pads_with_zero() {
        assert_eq!(checksum(&[0xAB]), checksum(&[0xAB, 0x00]));
    }

    #[test]
    fn test_carry_folding() {
        // 0xFFFF + 0x0001 overflows into bit 16 and folds back to 0x0001.
        assert_eq!(checksum(&[0xFF, 0xFF, 0x00, 0x01]), !0x0001);
    }

    #[test]
    fn test_known_ipv4_header() {
        // Classic example header with checksum 0xb861.
        let mut header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(checksum(&header), 0xb861);
        header[10..12].copy_from_slice(&0xb861u16.to_be_bytes());
        assert!(verify(&header));
    }
}
