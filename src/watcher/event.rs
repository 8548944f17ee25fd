use crate::source::ChangeEvent;

/// Internal watch event types after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A template (or directory under a source root) was created, modified or deleted.
    Changed(ChangeEvent),
    /// Something that is not a template vanished under a source root (a moved or deleted
    /// directory, usually). The templates it held are found by rescanning.
    Rescan,
    /// `twirl-build.toml` changed; settings must be reloaded and everything rebuilt.
    ConfigChanged,
}
