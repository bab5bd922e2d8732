use tokio::sync::mpsc::UnboundedSender;

/// Receives user-visible progress lines.
pub trait StatusSink: Send + Sync {
    fn status(&self, line: &str);
}

/// Side effects after submissions: refresh the profile (credits) and derived views.
pub trait RefreshHook: Send + Sync {
    fn refresh_profile(&self) {}
    fn refresh_secrets(&self) {}
}

pub struct NoRefresh;

impl RefreshHook for NoRefresh {}

impl StatusSink for UnboundedSender<String> {
    fn status(&self, line: &str) {
        // receiver gone means nobody is listening any more
        let _ = self.send(line.to_string());
    }
}
