pub mod phase_queries;
