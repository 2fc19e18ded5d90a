pub mod client;

pub use client::TwitterClient;
