//! Object store gateway abstraction

mod memory;
mod s3;
mod traits;

pub use memory::{GatewayCall, GatewayOp, MemoryGateway};
pub use s3::{S3Gateway, MAX_PRESIGN_VALIDITY};
pub use traits::{GatewayError, ObjectStoreGateway, RemoteSession};
