//! Wire protocol: frame format, alias tables, message shapes and the
//! batching codec that ties them together.

pub mod alias;
pub mod codec;
pub mod frame;
pub mod messages;

pub use alias::AliasTable;
pub use codec::{Codec, CodecSettings, InboundEvent};
pub use messages::{InboundMessage, Operation, Outbound};
