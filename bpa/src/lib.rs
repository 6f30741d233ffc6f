/*!
The bundle processing agent of the sojourn DTN stack.

A [`node::Node`] wires together the [`store::BundleStore`], the
[`fragmentation::FragmentationManager`], a [`routing::Engine`] running a
pluggable [`routing::Strategy`], and any number of registered convergence
layers implementing [`cla::Cla`]. Convergence layers talk back to the node
through the [`cla::Sink`] capability they are given at registration; nothing
in the stack holds a reference pointing back up the graph.
*/

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use sojourn_bpv7 as bpv7;

pub mod cla;
pub mod config;
pub mod fragmentation;
pub mod node;
pub mod peer;
pub mod routing;
pub mod store;

mod report;
