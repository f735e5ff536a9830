pub mod loopback;

pub use loopback::{LoopbackChannel, LoopbackNetwork, LoopbackTransport};
