pub mod doc;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod timeseries_handlers;
