//! Blockport - a chunked voxel world engine with binary client/server sync

pub mod client;
pub mod core;
pub mod math;
pub mod mesher;
pub mod net;
pub mod physics;
pub mod protocol;
pub mod world;
