//! Wire protocol shared by the server and the client.

pub mod codec;
pub mod wire;

pub use codec::{completion_frame, decode_stream, encode_frame, encode_stream, FrameDecoder, FrameEncoder};
pub use wire::{CompletionMarker, WireEvent, COMPLETE_STATUS};
