//! Hand-rolled STUN Binding Request/Response: just enough of RFC 5389 to
//! learn a server-reflexive address, nothing more.

use bytes::{Buf, BufMut, BytesMut};
use std::net::{Ipv4Addr, SocketAddrV4};

use unn_common::UnnError;

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS_RESPONSE: u16 = 0x0101;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const FAMILY_IPV4: u8 = 0x01;

pub type TransactionId = [u8; 12];

/// Build a Binding Request: type `0x0001`, zero attributes, the fixed
/// magic cookie, and a fresh random transaction id.
pub fn build_binding_request() -> (BytesMut, TransactionId) {
    let txn: TransactionId = rand::random();

    let mut buf = BytesMut::with_capacity(20);
    buf.put_u16(BINDING_REQUEST);
    buf.put_u16(0); // message length: zero attributes
    buf.put_u32(MAGIC_COOKIE);
    buf.put_slice(&txn);

    (buf, txn)
}

/// Parse a Binding Response, returning the server-reflexive address if
/// the transaction id matches and a (XOR-)MAPPED-ADDRESS attribute is
/// present. Any other datagram (different transaction, malformed framing,
/// unsupported family) is rejected without panicking.
pub fn parse_binding_response(
    mut data: &[u8],
    expected_txn: &TransactionId,
) -> Result<SocketAddrV4, UnnError> {
    if data.len() < 20 {
        return Err(UnnError::Protocol("STUN response shorter than header".into()));
    }

    let msg_type = data.get_u16();
    let msg_len = data.get_u16() as usize;
    let cookie = data.get_u32();
    let mut txn = [0u8; 12];
    data.copy_to_slice(&mut txn);

    if msg_type != BINDING_SUCCESS_RESPONSE {
        return Err(UnnError::Protocol(format!(
            "unexpected STUN message type {msg_type:#06x}"
        )));
    }
    if cookie != MAGIC_COOKIE {
        return Err(UnnError::Protocol("STUN magic cookie mismatch".into()));
    }
    if &txn != expected_txn {
        return Err(UnnError::Protocol("STUN transaction id mismatch".into()));
    }
    if data.remaining() < msg_len {
        return Err(UnnError::Protocol("STUN message length exceeds datagram".into()));
    }

    let mut attrs = &data[..msg_len];
    let mut mapped: Option<SocketAddrV4> = None;
    let mut xor_mapped: Option<SocketAddrV4> = None;

    while attrs.remaining() >= 4 {
        let attr_type = attrs.get_u16();
        let attr_len = attrs.get_u16() as usize;
        let padded = attr_len.div_ceil(4) * 4;
        if attrs.remaining() < padded {
            break;
        }
        let value = &attrs[..attr_len];

        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS if attr_len >= 8 => {
                xor_mapped = decode_xor_mapped_address(value);
            }
            ATTR_MAPPED_ADDRESS if attr_len >= 8 => {
                mapped = decode_mapped_address(value);
            }
            _ => {}
        }

        attrs.advance(padded);
    }

    xor_mapped
        .or(mapped)
        .ok_or_else(|| UnnError::Protocol("STUN response had no mapped address".into()))
}

fn decode_mapped_address(value: &[u8]) -> Option<SocketAddrV4> {
    if value[1] != FAMILY_IPV4 {
        return None;
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    let addr = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
    Some(SocketAddrV4::new(addr, port))
}

fn decode_xor_mapped_address(value: &[u8]) -> Option<SocketAddrV4> {
    if value[1] != FAMILY_IPV4 {
        return None;
    }
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let port = u16::from_be_bytes([value[2], value[3]]) ^ u16::from_be_bytes([cookie[0], cookie[1]]);
    let octets = [
        value[4] ^ cookie[0],
        value[5] ^ cookie[1],
        value[6] ^ cookie[2],
        value[7] ^ cookie[3],
    ];
    Some(SocketAddrV4::new(Ipv4Addr::from(octets), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_response(txn: &TransactionId, attr_type: u16, family: u8, port: u16, addr: [u8; 4]) -> BytesMut {
        let mut value = BytesMut::with_capacity(8);
        value.put_u8(0);
        value.put_u8(family);
        if attr_type == ATTR_XOR_MAPPED_ADDRESS {
            let cookie = MAGIC_COOKIE.to_be_bytes();
            value.put_u16(port ^ u16::from_be_bytes([cookie[0], cookie[1]]));
            value.put_slice(&[
                addr[0] ^ cookie[0],
                addr[1] ^ cookie[1],
                addr[2] ^ cookie[2],
                addr[3] ^ cookie[3],
            ]);
        } else {
            value.put_u16(port);
            value.put_slice(&addr);
        }

        let mut buf = BytesMut::with_capacity(32);
        buf.put_u16(BINDING_SUCCESS_RESPONSE);
        buf.put_u16(12); // one attribute: 4-byte TLV header + 8-byte value
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(txn);
        buf.put_u16(attr_type);
        buf.put_u16(8);
        buf.put_slice(&value);
        buf
    }

    #[test]
    fn builds_well_formed_binding_request() {
        let (buf, txn) = build_binding_request();
        assert_eq!(buf.len(), 20);
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), BINDING_REQUEST);
        assert_eq!(&buf[8..20], &txn);
    }

    #[test]
    fn parses_xor_mapped_address() {
        let (_, txn) = build_binding_request();
        let resp = encode_response(&txn, ATTR_XOR_MAPPED_ADDRESS, FAMILY_IPV4, 51820, [203, 0, 113, 9]);
        let addr = parse_binding_response(&resp, &txn).unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 9), 51820));
    }

    #[test]
    fn falls_back_to_plain_mapped_address() {
        let (_, txn) = build_binding_request();
        let resp = encode_response(&txn, ATTR_MAPPED_ADDRESS, FAMILY_IPV4, 4242, [198, 51, 100, 2]);
        let addr = parse_binding_response(&resp, &txn).unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 2), 4242));
    }

    #[test]
    fn rejects_transaction_id_mismatch() {
        let (_, txn) = build_binding_request();
        let (_, other_txn) = build_binding_request();
        let resp = encode_response(&txn, ATTR_XOR_MAPPED_ADDRESS, FAMILY_IPV4, 1, [1, 2, 3, 4]);
        assert!(parse_binding_response(&resp, &other_txn).is_err());
    }
}
