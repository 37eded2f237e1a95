use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Strip styling so assertions can compare visible text.
pub fn plain(text: &str) -> String {
    crate::ui::ansi::strip_ansi(text)
}
