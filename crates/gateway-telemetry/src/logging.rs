//! Structured logging helpers.
//!
//! Every gateway log line carries a `component` field naming the piece of
//! the pipeline that emitted it (`replay_guard`, `allowlist`, `audit`, ...),
//! so a JSON log can be filtered per component without parsing messages.
//!
//! Never pass signing keys, signatures, or payload bodies as fields.
//! Reference payloads by their SHA-256 hash instead.

/// Emit a tracing event with a `component` field.
///
/// ```rust,ignore
/// log_event!(warn, "replay_guard", "Replayed request rejected", request_id = %id);
/// ```
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a pipeline rejection with the standard fields.
#[macro_export]
macro_rules! log_rejection {
    ($component:expr, $request_id:expr, $code:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            component = $component,
            request_id = %$request_id,
            code = %$code,
            $($($field)*,)?
            $msg
        )
    };
}
