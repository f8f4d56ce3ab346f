//! Pipeline-level tests exercising the full answer flow.

mod pipeline_flow;
