pub mod frames;

pub use frames::{WireFrame, SOURCE_NETWORK, SOURCE_SAME_ORIGIN, SOURCE_SERVER};
