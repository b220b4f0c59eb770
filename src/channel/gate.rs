use super::{Channel, MessageHandler};
use crate::error::Result;
use crate::protocol::{ProtocolMessage, HEADER_FROM};

/// Stamps every inbound message with the id of the connection it arrived on
/// under the `from` header, so later handlers can address the origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct OriginStamp;

impl MessageHandler for OriginStamp {
    fn on_message(&self, channel: &Channel, msg: &mut ProtocolMessage) -> Result<()> {
        msg.header
            .insert(HEADER_FROM.to_string(), channel.id().to_string());
        Ok(())
    }
}
