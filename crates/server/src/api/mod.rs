pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod statistics;
pub mod torrents;

pub use routes::create_router;
