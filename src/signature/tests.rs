use crate::proto::Type;
use crate::{Signature, SignatureError};

#[test]
fn valid_signatures() {
    for sig in [
        &b""[..],
        b"y",
        b"i",
        b"s",
        b"o",
        b"g",
        b"h",
        b"v",
        b"ai",
        b"aai",
        b"a{sv}",
        b"(i)",
        b"(iis)",
        b"(i(ai))",
        b"a{s(ii)}",
        b"a{yv}",
        b"ya{sv}x",
        b"sa{sv}as",
    ] {
        assert!(Signature::new(sig).is_ok(), "{:?}", sig);
    }
}

#[test]
fn malformed_signatures() {
    assert_eq!(
        Signature::new(b"a"),
        Err(SignatureError::MissingArrayElementType)
    );
    assert_eq!(
        Signature::new(b"("),
        Err(SignatureError::StructStartedButNotEnded)
    );
    assert_eq!(Signature::new(b"()"), Err(SignatureError::StructHasNoFields));
    assert_eq!(
        Signature::new(b"a{y}"),
        Err(SignatureError::DictEntryHasOnlyOneField)
    );
    assert_eq!(
        Signature::new(b"a{yi"),
        Err(SignatureError::DictStartedButNotEnded)
    );
    assert_eq!(
        Signature::new(b"a{aii}"),
        Err(SignatureError::DictKeyMustBeBasicType)
    );
    assert_eq!(
        Signature::new(b"a{vi}"),
        Err(SignatureError::DictKeyMustBeBasicType)
    );
    assert_eq!(
        Signature::new(b"{ii}"),
        Err(SignatureError::DictEntryNotInsideArray)
    );
    assert_eq!(
        Signature::new(b"a{iii}"),
        Err(SignatureError::DictEntryHasTooManyFields)
    );
    assert_eq!(Signature::new(b"z"), Err(SignatureError::UnknownTypeCode));
    assert_eq!(Signature::new(b"i)"), Err(SignatureError::StructEndedButNotStarted));
}

#[test]
fn excessive_recursion() {
    let mut sig = Vec::new();
    sig.extend(std::iter::repeat(b'a').take(33));
    sig.push(b'i');

    assert_eq!(
        Signature::new(&sig),
        Err(SignatureError::ExceededMaximumArrayRecursion)
    );
}

#[test]
fn walk_yields_each_complete_type_once() {
    let sig = Signature::new(b"ya{sv}x(i(ai))as").unwrap();
    let mut iter = sig.iter();

    let token = iter.next().unwrap();
    assert_eq!(token.code(), Type::BYTE);
    assert!(token.inner().is_empty());

    let token = iter.next().unwrap();
    assert_eq!(token.code(), Type::ARRAY);
    assert_eq!(token.full(), b"a{sv}");
    assert_eq!(token.inner(), b"{sv}");

    let token = iter.next().unwrap();
    assert_eq!(token.code(), Type::INT64);

    let token = iter.next().unwrap();
    assert_eq!(token.code(), Type::OPEN_PAREN);
    assert_eq!(token.inner(), b"i(ai)");

    let token = iter.next().unwrap();
    assert_eq!(token.code(), Type::ARRAY);
    assert_eq!(token.inner(), b"s");

    assert!(iter.next().is_none());
}

#[test]
fn walk_dict_entry_element() {
    let sig = Signature::new(b"a{sv}").unwrap();
    let array = sig.iter().next().unwrap();

    let mut inner = array.inner().iter();
    let entry = inner.next().unwrap();
    assert_eq!(entry.code(), Type::OPEN_BRACE);
    assert_eq!(entry.inner(), b"sv");
    assert!(inner.next().is_none());

    let mut fields = entry.inner().iter();
    assert_eq!(fields.next().unwrap().code(), Type::STRING);
    assert_eq!(fields.next().unwrap().code(), Type::VARIANT);
    assert!(fields.next().is_none());
}

#[test]
fn inner_views_are_valid_where_expected() {
    for sig in [&b"a{s(ii)}"[..], b"(i(ai))", b"aas", b"a{sv}"] {
        let sig = Signature::new(sig).unwrap();

        for token in sig.iter() {
            if token.code() == Type::OPEN_PAREN {
                assert!(Signature::new(token.inner().as_bytes()).is_ok());
            }
        }
    }
}

#[test]
fn single_complete_type() {
    assert!(Signature::new(b"a{sv}").unwrap().is_single_complete_type());
    assert!(Signature::new(b"(iis)").unwrap().is_single_complete_type());
    assert!(!Signature::new(b"ii").unwrap().is_single_complete_type());
    assert!(!Signature::EMPTY.is_single_complete_type());
}
