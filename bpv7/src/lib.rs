/*!
An implementation of the Bundle Protocol version 7 data model, as defined in
[RFC 9171](https://www.rfc-editor.org/rfc/rfc9171.html).

This crate provides the building blocks for working with BPv7 bundles:
creation via [`builder::Builder`], parsing via [`bundle::Bundle::parse`], and
manipulation of the primary and canonical blocks.

# Example

```rust
use sojourn_bpv7::builder::Builder;
use sojourn_bpv7::creation_timestamp::CreationTimestamp;
use sojourn_bpv7::eid::Eid;

let source: Eid = "dtn://a/".parse().unwrap();
let destination: Eid = "dtn://b/".parse().unwrap();

let bundle = Builder::new(source, destination)
    .with_payload(b"Hello, world!".as_slice())
    .build(CreationTimestamp::now());

let encoded = bundle.to_cbor();
let decoded = sojourn_bpv7::bundle::Bundle::parse(&encoded).unwrap();
assert_eq!(decoded.id(), bundle.id());
```
*/

use sojourn_cbor as cbor;

pub mod block;
pub mod builder;
pub mod bundle;
pub mod crc;
pub mod creation_timestamp;
pub mod dtn_time;
pub mod eid;
pub mod hop_count;
pub mod primary_block;
pub mod status_report;

mod error;
pub use error::Error;
