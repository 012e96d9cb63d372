use crate::events::{
    dispatcher,
    model::{LogEvent, LogLevel, NetworkEvent, RelayEvent},
};
use crate::network::packet::Packet;

/// Emit a structured network event.
pub(crate) fn emit_network_event(
    component: &'static str,
    level: LogLevel,
    action: &str,
    addr: Option<String>,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta(component, level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Network(NetworkEvent {
        meta,
        action: action.to_string(),
        addr,
        detail,
    }));
}

/// Emit a relay decision for one packet.
pub(crate) fn emit_relay_event(
    level: LogLevel,
    action: &str,
    packet: &Packet,
    neighbor: Option<u64>,
    detail: Option<String>,
) {
    let meta = dispatcher::meta("relay", level);
    dispatcher::emit(LogEvent::Relay(RelayEvent {
        meta,
        action: action.to_string(),
        packet_id: packet.id.clone(),
        session_id: packet.session_id.clone(),
        neighbor,
        detail,
    }));
}
