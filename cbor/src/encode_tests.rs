use super::encode::*;
use hex_literal::hex;

#[test]
fn rfc_appendix_a_integers() {
    // https://www.rfc-editor.org/rfc/rfc8949.html#section-appendix.a
    assert_eq!(emit(&0u64), hex!("00"));
    assert_eq!(emit(&1u64), hex!("01"));
    assert_eq!(emit(&10u64), hex!("0a"));
    assert_eq!(emit(&23u64), hex!("17"));
    assert_eq!(emit(&24u64), hex!("1818"));
    assert_eq!(emit(&25u64), hex!("1819"));
    assert_eq!(emit(&100u64), hex!("1864"));
    assert_eq!(emit(&1000u64), hex!("1903e8"));
    assert_eq!(emit(&1000000u64), hex!("1a000f4240"));
    assert_eq!(emit(&1000000000000u64), hex!("1b000000e8d4a51000"));
    assert_eq!(emit(&18446744073709551615u64), hex!("1bffffffffffffffff"));

    assert_eq!(emit(&-1i64), hex!("20"));
    assert_eq!(emit(&-10i64), hex!("29"));
    assert_eq!(emit(&-100i64), hex!("3863"));
    assert_eq!(emit(&-1000i64), hex!("3903e7"));
    assert_eq!(emit(&i64::MIN), hex!("3b7fffffffffffffff"));
}

#[test]
fn rfc_appendix_a_floats() {
    assert_eq!(emit(&0.0), hex!("f90000"));
    assert_eq!(emit(&-0.0), hex!("f98000"));
    assert_eq!(emit(&1.0), hex!("f93c00"));
    assert_eq!(emit(&1.1), hex!("fb3ff199999999999a"));
    assert_eq!(emit(&1.5), hex!("f93e00"));
    assert_eq!(emit(&65504.0), hex!("f97bff"));
    assert_eq!(emit(&100000.0), hex!("fa47c35000"));
    assert_eq!(emit(&3.4028234663852886e+38), hex!("fa7f7fffff"));
    assert_eq!(emit(&1.0e+300), hex!("fb7e37e43c8800759c"));
    assert_eq!(emit(&5.960464477539063e-8), hex!("f90001"));
    assert_eq!(emit(&0.00006103515625), hex!("f90400"));
    assert_eq!(emit(&-4.0), hex!("f9c400"));
    assert_eq!(emit(&-4.1), hex!("fbc010666666666666"));

    assert_eq!(emit(&half::f16::INFINITY), hex!("f97c00"));
    assert_eq!(emit(&half::f16::NEG_INFINITY), hex!("f9fc00"));
    assert_eq!(emit(&f32::NAN), hex!("fa7fc00000"));

    // Infinities shrink losslessly per RFC 8949 4.2.1
    assert_eq!(emit(&f32::INFINITY), hex!("f97c00"));
    assert_eq!(emit(&f64::INFINITY), hex!("f97c00"));
    assert_eq!(emit(&f64::NEG_INFINITY), hex!("f9fc00"));
}

#[test]
fn rfc_appendix_a_simple() {
    assert_eq!(emit(&false), hex!("f4"));
    assert_eq!(emit(&true), hex!("f5"));
    assert_eq!(emit(&None::<u64>), hex!("f7"));
    assert_eq!(emit_simple_value(16), hex!("f0"));
    assert_eq!(emit_simple_value(255), hex!("f8ff"));
}

#[test]
fn rfc_appendix_a_strings() {
    assert_eq!(emit(&[] as &[u8]), hex!("40"));
    assert_eq!(emit(&hex!("01020304")), hex!("4401020304"));
    assert_eq!(emit(""), hex!("60"));
    assert_eq!(emit("a"), hex!("6161"));
    assert_eq!(emit("IETF"), hex!("6449455446"));
    assert_eq!(emit("\"\\"), hex!("62225c"));
    assert_eq!(emit("\u{00fc}"), hex!("62c3bc"));
    assert_eq!(emit("\u{6c34}"), hex!("63e6b0b4"));
}

#[test]
fn rfc_appendix_a_tags() {
    assert_eq!(
        emit_tagged("2013-03-21T20:04:00Z", [0u64]),
        hex!("c074323031332d30332d32315432303a30343a30305a")
    );
    assert_eq!(emit_tagged(&1363896240u64, [1u64]), hex!("c11a514b67b0"));
    assert_eq!(
        emit_tagged(&hex!("01020304"), [23u64]),
        hex!("d74401020304")
    );
}

#[test]
fn rfc_appendix_a_arrays() {
    assert_eq!(emit_array(0, |_| {}), hex!("80"));
    assert_eq!(
        emit_array(3, |a| {
            a.emit(&1u64);
            a.emit(&2u64);
            a.emit(&3u64);
        }),
        hex!("83010203")
    );
    assert_eq!(
        emit_array(3, |a| {
            a.emit(&1u64);
            a.emit_array(2, |a| {
                a.emit(&2u64);
                a.emit(&3u64);
            });
            a.emit_array(2, |a| {
                a.emit(&4u64);
                a.emit(&5u64);
            });
        }),
        hex!("8301820203820405")
    );
    assert_eq!(
        emit_array(25, |a| {
            for i in 1u64..=25 {
                a.emit(&i);
            }
        }),
        hex!("98190102030405060708090a0b0c0d0e0f101112131415161718181819")
    );
}

#[test]
fn rfc_appendix_a_maps() {
    assert_eq!(emit_map(0, |_| {}), hex!("a0"));
    assert_eq!(
        emit_map(2, |m| {
            m.emit(&1u64);
            m.emit(&2u64);
            m.emit(&3u64);
            m.emit(&4u64);
        }),
        hex!("a201020304")
    );
    assert_eq!(
        emit_map(2, |m| {
            m.emit("a");
            m.emit(&1u64);
            m.emit("b");
            m.emit_array(2, |a| {
                a.emit(&2u64);
                a.emit(&3u64);
            });
        }),
        hex!("a26161016162820203")
    );
}

#[test]
fn map_canonical_ordering() {
    // Entries come out sorted by key length, then key bytes, whatever the
    // emission order.
    let expected = emit_map(3, |m| {
        m.emit("a");
        m.emit(&0u64);
        m.emit("b");
        m.emit(&1u64);
        m.emit("aa");
        m.emit(&2u64);
    });
    let shuffled = emit_map(3, |m| {
        m.emit("aa");
        m.emit(&2u64);
        m.emit("b");
        m.emit(&1u64);
        m.emit("a");
        m.emit(&0u64);
    });
    assert_eq!(expected, shuffled);
    assert_eq!(expected, hex!("a361610061620162616102"));
}

#[test]
#[should_panic(expected = "short of items")]
fn short_array_panics() {
    emit_array(2, |a| {
        a.emit(&1u64);
    });
}

#[test]
fn raw_and_skip_placeholders() {
    // An array may account for an item appended out-of-band
    let mut partial = emit_array(2, |a| {
        a.emit(&7u64);
        a.skip_value();
    });
    partial.extend(emit(&8u64));
    assert_eq!(
        partial,
        emit_array(2, |a| {
            a.emit(&7u64);
            a.emit(&8u64);
        })
    );
}
