// Library root: Cartola API client, lineup submission, market sync and the
// per-team pipeline.

pub mod cartola;
pub mod pipeline;
pub mod season;
pub mod submitter;
pub mod sync;
