//! JSON payload support.

use super::{ProtocolBuilder, ProtocolModule};
use crate::codec::JsonCodec;

/// Protocol module installing [`JsonCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodecModule;

impl ProtocolModule for JsonCodecModule {
    fn on_builder_created(&self, builder: &mut ProtocolBuilder) {
        builder.codec(JsonCodec);
    }
}
