mod handler;

pub use handler::{consume_stream, StreamOutcome};
