pub mod client;

pub use client::MxrpcClient;
