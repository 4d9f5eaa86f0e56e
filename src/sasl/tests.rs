use super::*;

#[test]
fn external_hex_encoding() {
    let mut buf = [0u8; 32];
    let Auth::External(payload) = Auth::external_from_u32(&mut buf, 0) else {
        panic!("expected external");
    };
    assert_eq!(payload, b"30");

    let mut buf = [0u8; 32];
    let Auth::External(payload) = Auth::external_from_u32(&mut buf, 1000) else {
        panic!("expected external");
    };
    assert_eq!(payload, b"31303030");

    let mut buf = [0u8; 32];
    let Auth::External(payload) = Auth::external_from_u32(&mut buf, 4294967295) else {
        panic!("expected external");
    };
    assert_eq!(payload, b"34323934393637323935");
}

#[test]
fn request_lines() {
    let mut out = Vec::new();
    let mut buf = [0u8; 32];

    write_request(&mut out, &SaslRequest::Auth(Auth::external_from_u32(&mut buf, 1000)));
    assert_eq!(out, b"AUTH EXTERNAL 31303030\r\n");

    out.clear();
    write_request(&mut out, &SaslRequest::Auth(Auth::Anonymous));
    assert_eq!(out, b"AUTH ANONYMOUS\r\n");

    out.clear();
    write_request(&mut out, &SaslRequest::NegotiateUnixFd);
    assert_eq!(out, b"NEGOTIATE_UNIX_FD\r\n");

    out.clear();
    write_request(&mut out, &SaslRequest::Begin);
    assert_eq!(out, b"BEGIN\r\n");
}

#[test]
fn response_lines() {
    match parse_response(b"OK 0123456789abcdef0123456789abcdef\r") {
        SaslResponse::Ok(guid) => {
            assert_eq!(guid.as_bytes(), b"0123456789abcdef0123456789abcdef");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    assert!(matches!(
        parse_response(b"REJECTED EXTERNAL DBUS_COOKIE_SHA1"),
        SaslResponse::Rejected
    ));
    assert!(matches!(
        parse_response(b"AGREE_UNIX_FD"),
        SaslResponse::AgreeUnixFd
    ));
    assert!(matches!(
        parse_response(b"ERROR unknown command"),
        SaslResponse::Other(..)
    ));
    assert!(matches!(parse_response(b"DATA"), SaslResponse::Other(..)));
}

#[test]
fn line_scanning() {
    assert!(take_line(b"OK abc").unwrap().is_none());

    let (line, consumed) = take_line(b"OK abc\r\nAGREE").unwrap().unwrap();
    assert_eq!(line, b"OK abc");
    assert_eq!(consumed, 8);

    // A line feed without carriage return is accepted.
    let (line, consumed) = take_line(b"OK abc\nrest").unwrap().unwrap();
    assert_eq!(line, b"OK abc");
    assert_eq!(consumed, 7);
}

#[test]
fn oversized_line_rejected() {
    let mut line = vec![b'x'; 600];
    assert!(take_line(&line).is_err());

    line.push(b'\n');
    assert!(take_line(&line).is_err());

    let mut line = vec![b'x'; 510];
    line.extend_from_slice(b"\r\n");
    assert!(take_line(&line).unwrap().is_some());
}
