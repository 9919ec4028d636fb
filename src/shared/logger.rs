//! Logging capability injected into the cloner and every repository handle.

/// Structured event sink for invoked commands.
///
/// Fields are passed as ordered `(key, value)` pairs: one list of string
/// fields and one of integer fields.
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]);
    fn info(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]);
}

/// Logger that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn debug(&self, _msg: &str, _strings: &[(&str, &str)], _ints: &[(&str, i64)]) {}

    fn info(&self, _msg: &str, _strings: &[(&str, &str)], _ints: &[(&str, i64)]) {}
}

/// Logger that forwards events to `tracing` at the matching level.
///
/// `tracing` field names are static, so the dynamic fields are rendered as
/// `strings` and `ints` debug values on the event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]) {
        tracing::debug!(strings = ?Fields(strings), ints = ?Fields(ints), "{msg}");
    }

    fn info(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]) {
        tracing::info!(strings = ?Fields(strings), ints = ?Fields(ints), "{msg}");
    }
}

/// Renders a field list as a `{key: value, ...}` map.
struct Fields<'a, V>(&'a [(&'a str, V)]);

impl<V: std::fmt::Debug> std::fmt::Debug for Fields<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
