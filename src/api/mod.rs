pub mod cycle_stats;
pub mod routes;
pub mod status;
