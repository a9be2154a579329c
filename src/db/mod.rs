// src/db/mod.rs
pub mod models;
pub mod mongodb;

pub use self::mongodb::MongoRepo;
