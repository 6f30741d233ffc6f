use super::*;

fn dtn_check(s: &str, node: &str, path: &[&str]) {
    let eid: Eid = s.parse().unwrap();
    match &eid {
        Eid::Dtn { node_name, demux } => {
            assert_eq!(&**node_name, node);
            assert_eq!(demux.len(), path.len());
            for (a, b) in demux.iter().zip(path) {
                assert_eq!(&**a, *b);
            }
        }
        eid => panic!("{s} parsed as {eid:?}"),
    }
    assert_eq!(eid.to_string(), s);
}

fn ipn_check(s: &str, node: u64, service: u64) {
    let eid: Eid = s.parse().unwrap();
    assert_eq!(
        eid,
        Eid::Ipn {
            node_number: node,
            service_number: service
        }
    );
    assert_eq!(eid.to_string(), s);
}

fn expect_error(s: &str) {
    assert!(
        s.parse::<Eid>().is_err(),
        "{s} should not parse as an EID"
    );
}

#[test]
fn tests() {
    // Positive tests
    ipn_check("ipn:1.2", 1, 2);
    ipn_check("ipn:1.0", 1, 0);
    ipn_check("ipn:977000.3", 977000, 3);

    assert_eq!("dtn:none".parse::<Eid>().unwrap(), Eid::Null);

    dtn_check("dtn://somewhere/", "somewhere", &[]);
    dtn_check("dtn://somewhere/else", "somewhere", &["else"]);
    dtn_check("dtn://somewhere/else/", "somewhere", &["else", ""]);
    dtn_check("dtn://somewhere%2Felse/", "somewhere/else", &[]);
    dtn_check(
        "dtn://somewhere/over/the/rainbow",
        "somewhere",
        &["over", "the", "rainbow"],
    );
    dtn_check(
        "dtn://somewhere/over%2Fthe/rainbow",
        "somewhere",
        &["over/the", "rainbow"],
    );
    dtn_check("dtn://somewhere//", "somewhere", &["", ""]);
    dtn_check("dtn://somewhere//else", "somewhere", &["", "else"]);

    // Negative tests
    expect_error("");
    expect_error("dtn");
    expect_error("ipn");
    expect_error(":");
    expect_error("spaniel:");

    expect_error("dtn:");
    expect_error("dtn:/");
    expect_error("dtn:somewhere");
    expect_error("dtn:/somewhere");
    expect_error("dtn://");
    expect_error("dtn://somewhere");
    expect_error("dtn:///else");

    expect_error("ipn:");
    expect_error("ipn:1");
    expect_error("ipn:1.2.3");
    expect_error("ipn:one.two");
    expect_error("ipn:-1.2");
}

#[test]
fn null_endpoint() {
    let null = Eid::Null;
    assert!(null.is_null());
    assert_eq!(null.to_string(), "dtn:none");
    assert_eq!(Eid::default(), null);
}

#[test]
fn ordering_follows_uri_strings() {
    let mut eids: Vec<Eid> = vec![
        "ipn:2.1".parse().unwrap(),
        "dtn://b/".parse().unwrap(),
        "ipn:10.1".parse().unwrap(),
        "dtn://a/x".parse().unwrap(),
    ];
    eids.sort();
    let strings: Vec<String> = eids.iter().map(|e| e.to_string()).collect();
    let mut sorted = strings.clone();
    sorted.sort();
    assert_eq!(strings, sorted);
}
