/// Emit a `SystemEvent` with a fresh correlation id.
///
/// `emit_system_event!("node", LogLevel::Info, "listening", Some(addr.to_string()))`
#[macro_export]
macro_rules! emit_system_event {
    ($component:expr, $level:expr, $action:expr, $detail:expr) => {{
        use $crate::events::{dispatcher, model::*};
        let mut meta = dispatcher::meta($component, $level);
        meta.corr_id = Some(dispatcher::correlation_id());
        dispatcher::emit(LogEvent::System(SystemEvent {
            meta,
            action: $action.to_string(),
            detail: $detail,
        }));
    }};
}

/// Emit a `SessionEvent` for a chat session.
#[macro_export]
macro_rules! emit_session_event {
    ($level:expr, $action:expr, $session_id:expr, $detail:expr) => {{
        use $crate::events::{dispatcher, model::*};
        let meta = dispatcher::meta("session", $level);
        dispatcher::emit(LogEvent::Session(SessionEvent {
            meta,
            action: $action.to_string(),
            session_id: $session_id.to_string(),
            detail: $detail,
        }));
    }};
}
