//! Integration test suite: full worker and runner pipeline against an
//! in-memory bookmaker.

mod mock_bookmaker;
mod pipeline;
