mod harness;

pub use harness::{read_json, ApiHarness, FixtureStore};
