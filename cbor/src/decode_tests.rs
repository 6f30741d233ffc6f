use super::decode::*;
use hex_literal::hex;

#[test]
fn rfc_appendix_a_integers() {
    assert_eq!(parse::<u64>(&hex!("00")).unwrap(), 0);
    assert_eq!(parse::<u64>(&hex!("01")).unwrap(), 1);
    assert_eq!(parse::<u64>(&hex!("0a")).unwrap(), 10);
    assert_eq!(parse::<u64>(&hex!("17")).unwrap(), 23);
    assert_eq!(parse::<u64>(&hex!("1818")).unwrap(), 24);
    assert_eq!(parse::<u64>(&hex!("1903e8")).unwrap(), 1000);
    assert_eq!(
        parse::<u64>(&hex!("1bffffffffffffffff")).unwrap(),
        18446744073709551615
    );
    assert_eq!(parse::<i64>(&hex!("20")).unwrap(), -1);
    assert_eq!(parse::<i64>(&hex!("29")).unwrap(), -10);
    assert_eq!(parse::<i64>(&hex!("3863")).unwrap(), -100);
    assert_eq!(parse::<i64>(&hex!("3903e7")).unwrap(), -1000);
    assert_eq!(parse::<i64>(&hex!("3b7fffffffffffffff")).unwrap(), i64::MIN);

    // Range errors
    assert!(parse::<u8>(&hex!("1903e8")).is_err());
    assert!(parse::<i64>(&hex!("3bffffffffffffffff")).is_err());
}

#[test]
fn rfc_appendix_a_floats() {
    assert_eq!(parse::<f64>(&hex!("f90000")).unwrap(), 0.0);
    assert_eq!(parse::<f64>(&hex!("f93c00")).unwrap(), 1.0);
    assert_eq!(parse::<f64>(&hex!("fb3ff199999999999a")).unwrap(), 1.1);
    assert_eq!(parse::<f64>(&hex!("f97bff")).unwrap(), 65504.0);
    assert_eq!(parse::<f64>(&hex!("fa47c35000")).unwrap(), 100000.0);
    assert_eq!(
        parse::<f64>(&hex!("fb7e37e43c8800759c")).unwrap(),
        1.0e+300
    );
    assert!(parse::<f64>(&hex!("f97c00")).unwrap().is_infinite());
    assert!(parse::<f64>(&hex!("f97e00")).unwrap().is_nan());
    assert!(parse::<f32>(&hex!("fb3ff199999999999a")).is_err());
}

#[test]
fn rfc_appendix_a_simple() {
    assert!(!parse::<bool>(&hex!("f4")).unwrap());
    assert!(parse::<bool>(&hex!("f5")).unwrap());
    assert_eq!(parse::<Option<u64>>(&hex!("f7")).unwrap(), None);
    assert_eq!(parse::<Option<u64>>(&hex!("0a")).unwrap(), Some(10));
}

#[test]
fn rfc_appendix_a_strings() {
    assert_eq!(parse::<Vec<u8>>(&hex!("40")).unwrap(), b"");
    assert_eq!(
        parse::<Vec<u8>>(&hex!("4401020304")).unwrap(),
        hex!("01020304")
    );
    assert_eq!(parse::<String>(&hex!("60")).unwrap(), "");
    assert_eq!(parse::<String>(&hex!("6449455446")).unwrap(), "IETF");
    assert_eq!(parse::<String>(&hex!("62c3bc")).unwrap(), "\u{00fc}");
}

#[test]
fn indefinite_length_items() {
    // (_ h'0102', h'030405')
    assert_eq!(
        parse::<Vec<u8>>(&hex!("5f42010243030405ff")).unwrap(),
        hex!("0102030405")
    );
    // (_ "strea", "ming")
    assert_eq!(
        parse::<String>(&hex!("7f657374726561646d696e67ff")).unwrap(),
        "streaming"
    );
    // [_ 1, [2, 3], [_ 4, 5]]
    let (items, len) = parse_array(&hex!("9f018202039f0405ffff"), |a, _| {
        assert!(!a.is_definite());
        let one = a.parse::<u64>()?;
        let (two, three) = a.parse_array(|inner, _, _| {
            Ok::<_, Error>((inner.parse::<u64>()?, inner.parse::<u64>()?))
        })?;
        let (four, five) = a.parse_array(|inner, _, _| {
            assert!(!inner.is_definite());
            Ok::<_, Error>((inner.parse::<u64>()?, inner.parse::<u64>()?))
        })?;
        Ok::<_, Error>([one, two, three, four, five])
    })
    .unwrap();
    assert_eq!(items, [1, 2, 3, 4, 5]);
    assert_eq!(len, 10);

    // {_ "a": 1, "b": [_ 2, 3]}
    let ok = try_parse_map(&hex!("bf61610161629f0203ffff"), |m, _| {
        assert_eq!(m.parse::<String>()?, "a");
        assert_eq!(m.parse::<u64>()?, 1);
        assert_eq!(m.parse::<String>()?, "b");
        m.parse_value(|mut v, _, _| v.skip(16))?;
        Ok::<_, Error>(true)
    })
    .unwrap();
    assert_eq!(ok, Some(true));
}

#[test]
fn arrays_and_offsets() {
    let data = hex!("8301820203820405");
    let ((), len) = parse_array(&data, |a, _| {
        assert_eq!(a.count(), Some(3));
        assert_eq!(a.parse::<u64>()?, 1);

        // Item start offsets are relative to the outer buffer
        a.try_parse_value(|value, start, _| {
            assert_eq!(start, 2);
            match value {
                Value::Array(inner) => {
                    inner.skip_to_end(16)?;
                    Ok::<(), Error>(())
                }
                _ => panic!("expected array"),
            }
        })?;

        a.skip_value()?;
        assert!(a.end()?.is_some());
        Ok::<_, Error>(())
    })
    .unwrap();
    assert_eq!(len, data.len());
}

#[test]
fn tags_are_surfaced() {
    let (tag, _) = parse_value(&hex!("c11a514b67b0"), |value, tags| {
        assert_eq!(tags, [1]);
        match value {
            Value::UnsignedInteger(n) => Ok::<_, Error>(n),
            _ => panic!("expected integer"),
        }
    })
    .unwrap();
    assert_eq!(tag, 1363896240);

    // Typed parsers refuse unexpected tags
    assert!(parse::<u64>(&hex!("c11a514b67b0")).is_err());
}

#[test]
fn malformed_input() {
    // Truncated payloads
    assert!(parse::<u64>(&hex!("19")).is_err());
    assert!(parse::<Vec<u8>>(&hex!("4401")).is_err());
    assert!(parse::<String>(&hex!("7f6573")).is_err());

    // Tags with nothing following
    assert!(parse::<u64>(&hex!("c1")).is_err());

    // Reserved minor values
    assert!(parse::<u64>(&hex!("1c")).is_err());

    // Map with a dangling key
    assert!(try_parse_map(&hex!("bf6161ff"), |m, _| {
        m.skip_to_end(16)?;
        Ok::<_, Error>(())
    })
    .is_err());

    // Invalid UTF-8 text
    assert!(parse::<String>(&hex!("62c328")).is_err());

    // Empty input is None, not an error
    assert!(try_parse::<u64>(&[]).unwrap().is_none());
}

#[test]
fn type_mismatches() {
    assert!(parse::<String>(&hex!("00")).is_err());
    assert!(parse::<u64>(&hex!("6161")).is_err());
    assert!(parse::<bool>(&hex!("f6")).is_err());
    assert!(parse::<Vec<u8>>(&hex!("6161")).is_err());
}
