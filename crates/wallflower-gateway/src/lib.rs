pub mod connection;
pub mod registry;
pub mod router;

pub use registry::Registry;
pub use router::EventRouter;
