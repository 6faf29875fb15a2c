/// Re-export `Config` from `tally-core` for use within this crate.
///
/// Environment parsing lives in `tally-core` so integration tests can build a
/// config without the server.
pub use tally_core::config::Config;
