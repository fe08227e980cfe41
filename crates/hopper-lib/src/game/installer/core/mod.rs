pub mod artifact;
pub mod downloader;
pub mod hashing;
pub mod pool;
pub mod traits;
