use std::num::NonZeroU32;

use crate::message::{Outbound, OutboundKind};
use crate::{
    BodyBuf, Endianness, Flags, MessageKind, ObjectPath, ReadBuf, Signature,
};

use super::helpers::ArrayWriter;
use super::owned_buf::OwnedBuf;
use super::{BufPool, MessageBuf, RecvBuf};

const BOTH: [Endianness; 2] = [Endianness::LITTLE, Endianness::BIG];

#[test]
fn padding_reaches_alignment() {
    let mut buf = OwnedBuf::with_endianness(Endianness::LITTLE);

    buf.store(1u8);
    buf.store(2u16);
    assert_eq!(buf.len() % 2, 0);

    buf.store(3u8);
    buf.store(4u32);
    assert_eq!(buf.len() % 4, 0);

    buf.store(5u8);
    buf.store(6u64);
    assert_eq!(buf.len() % 8, 0);

    assert_eq!(
        buf.get(),
        &[1, 0, 2, 0, 3, 0, 0, 0, 4, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 6, 0, 0, 0, 0, 0, 0, 0][..]
    );
}

#[test]
fn scalar_round_trip() {
    for endianness in BOTH {
        let mut buf = OwnedBuf::with_endianness(endianness);

        buf.store(0x12u8);
        buf.store(-2i16);
        buf.store(0x1234u16);
        buf.store(-3i32);
        buf.store(0x12345678u32);
        buf.store(-4i64);
        buf.store(0x123456789abcdefu64);
        buf.store(3.5f64);

        let mut read = ReadBuf::from_slice(buf.get(), endianness);

        assert_eq!(read.load::<u8>().unwrap(), 0x12);
        assert_eq!(read.load::<i16>().unwrap(), -2);
        assert_eq!(read.load::<u16>().unwrap(), 0x1234);
        assert_eq!(read.load::<i32>().unwrap(), -3);
        assert_eq!(read.load::<u32>().unwrap(), 0x12345678);
        assert_eq!(read.load::<i64>().unwrap(), -4);
        assert_eq!(read.load::<u64>().unwrap(), 0x123456789abcdef);
        assert_eq!(read.load::<f64>().unwrap(), 3.5);
        assert!(read.is_empty());
    }
}

#[test]
fn truncated_load_fails() {
    let mut read = ReadBuf::from_slice_le(&[1, 2, 3]);
    assert!(read.load::<u32>().unwrap_err().is_truncated());

    let mut read = ReadBuf::from_slice_le(&[1, 0, 0, 0, 2]);
    assert_eq!(read.load::<u32>().unwrap(), 1);
    assert!(read.load::<u32>().unwrap_err().is_truncated());
}

#[test]
fn string_round_trip() {
    for endianness in BOTH {
        let mut buf = OwnedBuf::with_endianness(endianness);

        buf.write("foo bar");
        buf.write(Signature::new(b"a{sv}").unwrap());
        buf.write(ObjectPath::new_const(b"/org/freedesktop/DBus"));

        let mut read = ReadBuf::from_slice(buf.get(), endianness);

        assert_eq!(read.read::<str>().unwrap(), "foo bar");
        assert_eq!(read.read::<Signature>().unwrap(), b"a{sv}");
        assert_eq!(
            read.read::<ObjectPath>().unwrap(),
            "/org/freedesktop/DBus"
        );
        assert!(read.is_empty());
    }
}

#[test]
fn bool_is_a_word() {
    let mut body = BodyBuf::with_endianness(Endianness::LITTLE);
    body.store(true);
    body.store(false);

    assert_eq!(body.signature(), b"bb");
    assert_eq!(body.get(), &[1, 0, 0, 0, 0, 0, 0, 0]);

    let mut read = body.read();
    assert!(read.load_bool().unwrap());
    assert!(!read.load_bool().unwrap());
}

#[test]
fn array_length_excludes_element_padding() {
    // An array of 64-bit values pads from the length prefix to the first
    // element; the length covers the elements alone.
    let mut buf = OwnedBuf::with_endianness(Endianness::LITTLE);

    let mut array = ArrayWriter::new(&mut buf, 8);
    array.store(1u64);
    array.store(2u64);
    array.finish();

    assert_eq!(buf.len(), 8 + 16);
    assert_eq!(&buf.get()[..8], &[16, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn empty_array_round_trip() {
    let mut body = BodyBuf::new();
    body.write_array(Signature::UINT64, |_| Ok(())).unwrap();

    let mut read = body.read();
    let mut array = read.read_array(8).unwrap();
    assert!(!array.has_next().unwrap());
}

#[test]
fn array_round_trip() {
    for endianness in BOTH {
        let mut body = BodyBuf::with_endianness(endianness);

        body.write_array(Signature::UINT32, |array| {
            array.store(1u32);
            array.store(2u32);
            array.store(3u32);
            Ok(())
        })
        .unwrap();

        assert_eq!(body.signature(), b"au");

        let mut read = body.read();
        let mut array = read.read_array(4).unwrap();
        let mut values = Vec::new();

        while array.has_next().unwrap() {
            values.push(array.buf().load::<u32>().unwrap());
        }

        assert_eq!(values, [1, 2, 3]);
        assert!(read.is_empty());
    }
}

#[test]
fn array_of_strings_round_trip() {
    let mut body = BodyBuf::new();

    body.write_array(Signature::STRING, |array| {
        array.write("foo");
        array.write("longer string");
        array.write("");
        Ok(())
    })
    .unwrap();

    let mut read = body.read();
    let mut array = read.read_array(4).unwrap();
    let mut values = Vec::new();

    while array.has_next().unwrap() {
        values.push(array.buf().read::<str>().unwrap());
    }

    assert_eq!(values, ["foo", "longer string", ""]);
}

#[test]
fn struct_round_trip() {
    for endianness in BOTH {
        let mut body = BodyBuf::with_endianness(endianness);

        body.store(10u8);

        body.write_struct(Signature::new(b"qus").unwrap(), |fields| {
            fields.store(10u16);
            fields.store(10u32);
            fields.write("Hello World");
            Ok(())
        })
        .unwrap();

        assert_eq!(body.signature(), b"y(qus)");

        let mut read = body.read();
        assert_eq!(read.load::<u8>().unwrap(), 10);
        read.read_struct().unwrap();
        assert_eq!(read.load::<u16>().unwrap(), 10);
        assert_eq!(read.load::<u32>().unwrap(), 10);
        assert_eq!(read.read::<str>().unwrap(), "Hello World");
        assert!(read.is_empty());
    }
}

#[test]
fn dict_round_trip() {
    let mut body = BodyBuf::new();

    body.write_dict(Signature::STRING, Signature::UINT32, |dict| {
        dict.write_struct(|entry| {
            entry.write("one");
            entry.store(1u32);
            Ok(())
        })?;

        dict.write_struct(|entry| {
            entry.write("two");
            entry.store(2u32);
            Ok(())
        })
    })
    .unwrap();

    assert_eq!(body.signature(), b"a{su}");

    let mut read = body.read();
    let mut array = read.read_array(8).unwrap();
    let mut values = Vec::new();

    while array.has_next().unwrap() {
        let buf = array.buf();
        buf.read_struct().unwrap();
        let key = buf.read::<str>().unwrap();
        let value = buf.load::<u32>().unwrap();
        values.push((key, value));
    }

    assert_eq!(values, [("one", 1), ("two", 2)]);
}

#[test]
fn variant_round_trip() {
    let mut body = BodyBuf::new();

    body.write_variant(Signature::STRING, |value| {
        value.write("dynamic");
        Ok(())
    })
    .unwrap();

    body.store(42u32);

    assert_eq!(body.signature(), b"vu");

    let mut read = body.read();
    let signature = read.read_variant().unwrap();
    assert_eq!(signature, b"s");
    assert_eq!(read.read::<str>().unwrap(), "dynamic");
    assert_eq!(read.load::<u32>().unwrap(), 42);
}

#[test]
fn nested_containers_round_trip() {
    let mut body = BodyBuf::new();

    body.write_array(Signature::new(b"ai").unwrap(), |outer| {
        outer.write_array(Signature::INT32, |inner| {
            inner.store(1i32);
            Ok(())
        })?;

        outer.write_array(Signature::INT32, |inner| {
            inner.store(2i32);
            inner.store(3i32);
            Ok(())
        })
    })
    .unwrap();

    assert_eq!(body.signature(), b"aai");

    let mut read = body.read();
    let mut outer = read.read_array(4).unwrap();
    let mut rows = Vec::new();

    while outer.has_next().unwrap() {
        let mut inner = outer.buf().read_array(4).unwrap();
        let mut row = Vec::new();

        while inner.has_next().unwrap() {
            row.push(inner.buf().load::<i32>().unwrap());
        }

        rows.push(row);
    }

    assert_eq!(rows, [vec![1], vec![2, 3]]);
}

#[test]
fn skip_over_unknown_values() {
    let mut body = BodyBuf::new();

    body.write_struct(Signature::new(b"ias").unwrap(), |fields| {
        fields.store(7i32);
        fields.write_array(Signature::STRING, |array| {
            array.write("a");
            array.write("b");
            Ok(())
        })
    })
    .unwrap();

    body.store(9u8);

    let mut read = body.read();
    read.skip(Signature::new(b"(ias)").unwrap()).unwrap();
    assert_eq!(read.load::<u8>().unwrap(), 9);
    assert!(read.is_empty());
}

#[test]
fn skip_variant_value() {
    let mut body = BodyBuf::new();

    body.write_variant(Signature::new(b"au").unwrap(), |value| {
        value.write_array(Signature::UINT32, |array| {
            array.store(1u32);
            array.store(2u32);
            Ok(())
        })
    })
    .unwrap();

    body.write("after");

    let mut read = body.read();
    read.skip(Signature::VARIANT).unwrap();
    assert_eq!(read.read::<str>().unwrap(), "after");
}

fn hello() -> Outbound<'static> {
    Outbound {
        kind: OutboundKind::MethodCall {
            path: ObjectPath::new_const(b"/org/freedesktop/DBus"),
            member: "Hello",
        },
        interface: Some("org.freedesktop.DBus"),
        destination: Some("org.freedesktop.DBus"),
        flags: Flags::EMPTY,
    }
}

fn feed(recv: &mut RecvBuf, bytes: &[u8]) {
    let mut rest = bytes;

    while !rest.is_empty() {
        let n = recv
            .fill_from(|chunk, _| {
                let n = chunk.len().min(rest.len());
                chunk[..n].copy_from_slice(&rest[..n]);
                Ok(n)
            })
            .unwrap();

        rest = &rest[n..];
    }
}

#[test]
fn encode_then_parse_method_call() {
    let mut body = BodyBuf::new();
    body.write("hello world");
    body.store(42u32);

    let mut buf = MessageBuf::new();
    buf.encode(&hello(), &mut body).unwrap();
    buf.set_serial(NonZeroU32::new(7).unwrap());

    let mut recv = RecvBuf::new();
    feed(&mut recv, buf.get());

    let message_ref = recv.try_read_message().unwrap().unwrap();
    assert_eq!(message_ref.total, buf.get().len());

    let message = recv.read_message(&message_ref).unwrap();

    assert_eq!(
        message.kind(),
        MessageKind::MethodCall {
            path: ObjectPath::new_const(b"/org/freedesktop/DBus"),
            member: "Hello",
        }
    );
    assert_eq!(message.serial().get(), 7);
    assert_eq!(message.interface(), Some("org.freedesktop.DBus"));
    assert_eq!(message.destination(), Some("org.freedesktop.DBus"));
    assert_eq!(message.signature(), b"su");

    let mut body = message.body();
    assert_eq!(body.read::<str>().unwrap(), "hello world");
    assert_eq!(body.load::<u32>().unwrap(), 42);
    assert!(body.is_empty());

    recv.advance(message_ref.total);
    assert!(recv.try_read_message().unwrap().is_none());
}

#[test]
fn try_read_message_is_idempotent() {
    let mut body = BodyBuf::new();
    body.store(1u64);

    let mut buf = MessageBuf::new();
    buf.encode(&hello(), &mut body).unwrap();
    buf.set_serial(NonZeroU32::new(1).unwrap());

    let bytes = buf.get().to_vec();

    let mut recv = RecvBuf::new();
    feed(&mut recv, &bytes[..10]);
    assert!(recv.try_read_message().unwrap().is_none());

    feed(&mut recv, &bytes[10..bytes.len() - 1]);
    assert!(recv.try_read_message().unwrap().is_none());

    feed(&mut recv, &bytes[bytes.len() - 1..]);

    let first = recv.try_read_message().unwrap().unwrap();
    let second = recv.try_read_message().unwrap().unwrap();
    assert_eq!(first.total, second.total);
    assert_eq!(first.serial, second.serial);
}

#[test]
fn concatenated_frames_parse_in_order() {
    let mut recv = RecvBuf::new();

    for serial in 1u32..=3 {
        let mut body = BodyBuf::new();
        body.store(serial);

        let mut buf = MessageBuf::new();
        buf.encode(&hello(), &mut body).unwrap();
        buf.set_serial(NonZeroU32::new(serial).unwrap());

        feed(&mut recv, buf.get());
    }

    for serial in 1u32..=3 {
        let message_ref = recv.try_read_message().unwrap().unwrap();
        let message = recv.read_message(&message_ref).unwrap();
        assert_eq!(message.serial().get(), serial);
        assert_eq!(message.body().load::<u32>().unwrap(), serial);
        recv.advance(message_ref.total);
    }

    assert!(recv.try_read_message().unwrap().is_none());
}

#[test]
fn rejects_bad_prologue() {
    let mut recv = RecvBuf::new();
    feed(&mut recv, &[b'x', 1, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(recv.try_read_message().is_err());

    let mut recv = RecvBuf::new();
    feed(&mut recv, &[b'l', 9, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(recv.try_read_message().is_err());

    // Version 2 is not spoken here.
    let mut recv = RecvBuf::new();
    feed(&mut recv, &[b'l', 1, 0, 2, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(recv.try_read_message().is_err());
}

#[test]
fn opposite_endian_parses_to_same_values() {
    let mut frames = Vec::new();

    for endianness in BOTH {
        let mut body = BodyBuf::with_endianness(endianness);
        body.store(0x01020304u32);
        body.write("payload");

        let mut buf = MessageBuf::new();
        buf.encode(&hello(), &mut body).unwrap();
        buf.set_serial(NonZeroU32::new(5).unwrap());
        frames.push(buf.get().to_vec());
    }

    let mut decoded = Vec::new();

    for frame in &frames {
        let mut recv = RecvBuf::new();
        feed(&mut recv, frame);

        let message_ref = recv.try_read_message().unwrap().unwrap();
        let message = recv.read_message(&message_ref).unwrap();
        let mut body = message.body();

        decoded.push((
            message.serial().get(),
            body.load::<u32>().unwrap(),
            body.read::<str>().unwrap().to_owned(),
        ));
    }

    assert_eq!(decoded[0], decoded[1]);
}

#[test]
fn reply_headers_round_trip() {
    let mut body = BodyBuf::new();
    body.write("went wrong");

    let reply_serial = NonZeroU32::new(9).unwrap();

    let outbound = Outbound {
        kind: OutboundKind::Error {
            error_name: "org.freedesktop.DBus.Error.Failed",
            reply_serial,
        },
        interface: None,
        destination: Some(":1.7"),
        flags: Flags::EMPTY,
    };

    let mut buf = MessageBuf::new();
    buf.encode(&outbound, &mut body).unwrap();
    buf.set_serial(NonZeroU32::new(10).unwrap());

    let mut recv = RecvBuf::new();
    feed(&mut recv, buf.get());

    let message_ref = recv.try_read_message().unwrap().unwrap();
    let message = recv.read_message(&message_ref).unwrap();

    assert_eq!(
        message.kind(),
        MessageKind::Error {
            error_name: "org.freedesktop.DBus.Error.Failed",
            reply_serial,
        }
    );
    assert_eq!(message.reply_serial(), Some(reply_serial));
    assert_eq!(message.body().read::<str>().unwrap(), "went wrong");
}

#[test]
fn body_starts_on_eight_byte_boundary() {
    // A header set whose encoded size is not a multiple of 8 forces padding
    // between the header array and the body.
    let mut body = BodyBuf::new();
    body.store(1u8);

    let mut buf = MessageBuf::new();
    buf.encode(&hello(), &mut body).unwrap();
    buf.set_serial(NonZeroU32::new(1).unwrap());

    let bytes = buf.get();
    let headers = u32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let body_start = 16 + headers + crate::utils::padding_to(8, headers);

    assert_eq!(body_start % 8, 0);
    assert_eq!(bytes[body_start], 1);
    assert_eq!(bytes.len(), body_start + 1);
}

#[test]
fn signature_skipped_for_unknown_field() {
    // A frame with an unrecognized header field code is still parsed; the
    // unknown field is skipped over by its signature.
    let mut buf = OwnedBuf::with_endianness(Endianness::LITTLE);

    buf.store(Endianness::LITTLE.0);
    buf.store(4u8); // SIGNAL
    buf.store(0u8);
    buf.store(1u8);
    let body_len = buf.alloc::<u32>();
    buf.store(1u32); // serial

    let mut array = ArrayWriter::new(&mut buf, 8);

    let mut st = array.write_struct();
    st.store(1u8); // PATH
    st.write(Signature::OBJECT_PATH);
    st.write(ObjectPath::new_const(b"/test"));

    let mut st = array.write_struct();
    st.store(2u8); // INTERFACE
    st.write(Signature::STRING);
    st.write("test.Iface");

    let mut st = array.write_struct();
    st.store(3u8); // MEMBER
    st.write(Signature::STRING);
    st.write("Member");

    // Field code 200 carrying a struct value.
    let mut st = array.write_struct();
    st.store(200u8);
    st.write(Signature::new(b"(iu)").unwrap());
    st.buf().align_mut(8);
    st.store(-1i32);
    st.store(7u32);

    array.finish();
    buf.align_mut(8);
    buf.store_at(body_len, 0u32);

    let mut recv = RecvBuf::new();
    feed(&mut recv, buf.get());

    let message_ref = recv.try_read_message().unwrap().unwrap();
    let message = recv.read_message(&message_ref).unwrap();

    assert_eq!(
        message.kind(),
        MessageKind::Signal {
            path: ObjectPath::new_const(b"/test"),
            member: "Member",
        }
    );
    assert_eq!(message.interface(), Some("test.Iface"));
}

#[test]
fn pool_reuses_buffers() {
    let pool = BufPool::new();

    let mut buf = pool.rent();
    let mut body = BodyBuf::new();
    body.store(1u32);
    buf.encode(&hello(), &mut body).unwrap();
    buf.set_serial(NonZeroU32::new(1).unwrap());

    pool.put(buf);
    assert_eq!(pool.len(), 1);

    let buf = pool.rent();
    assert!(buf.get().is_empty());
    assert_eq!(pool.len(), 0);
    pool.put(buf);
}

#[test]
fn dict_key_must_be_basic() {
    let mut body = BodyBuf::new();

    assert!(body
        .write_dict(Signature::VARIANT, Signature::UINT32, |_| Ok(()))
        .is_err());

    assert!(body
        .write_array(Signature::new(b"ii").unwrap(), |_| Ok(()))
        .is_err());
}

#[test]
fn unix_fd_index_encoding() {
    use std::os::fd::AsFd;

    let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();

    let mut body = BodyBuf::with_endianness(Endianness::LITTLE);
    body.store_fd(a.as_fd()).unwrap();
    body.store_fd(a.as_fd()).unwrap();

    assert_eq!(body.signature(), b"hh");
    assert_eq!(body.unix_fds(), 2);
    assert_eq!(body.get(), &[0, 0, 0, 0, 1, 0, 0, 0]);

    let fds = body.take_fds();
    assert_eq!(fds.len(), 2);
}
