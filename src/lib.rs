pub mod asset;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod geometry;
pub mod grid;
pub mod scheduler;
pub mod snapshot;
pub mod tasks {
    pub mod loader;
    pub mod viewer;
}
