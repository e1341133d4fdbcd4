pub mod filehost;
pub mod paste;
pub mod tmdb;
