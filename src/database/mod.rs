pub mod connection;
pub mod games;
pub mod leaderboard;
pub mod leagues;
pub mod matches;
pub mod models;
pub mod players;
pub mod ratings;
pub mod sessions;
pub mod setup;

pub use connection::{
    DbConn, DbPool, create_memory_pool, create_pool, get_connection, with_read_transaction,
    with_transaction,
};
pub use models::*;
