//! Multi-client text chat over length-prefixed TCP frames.
//!
//! A server tags every connection with a login and relays each line it
//! receives to every other connected client. Each module focuses on one
//! responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] accepts TCP connections and starts a session per connection.
//! - [`registry`] keeps the set of live sessions and fans broadcasts out.
//! - [`session`] runs one connection from login to exit and owns its writer.
//! - [`client`] connects to a server, printing incoming lines while
//!   forwarding stdin.
//! - [`frame`] reads and writes `[u16 length][payload]` frames.
//! - [`mutf8`] implements the Java-compatible payload encoding.
//!
//! Integration tests drive a real [`server::Server`] on an ephemeral port;
//! the end-to-end test runs the compiled binary.

pub mod cli;
pub mod client;
pub mod frame;
pub mod mutf8;
pub mod registry;
pub mod server;
pub mod session;
