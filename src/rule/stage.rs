use strum::{AsRefStr, Display, EnumString};

/// Lifecycle phase of a data item: it has just entered the system, is inside a
/// component, or is about to leave the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
pub enum Stage {
    #[strum(serialize = "import")]
    Imported,
    #[strum(serialize = "processing")]
    Processing,
    #[strum(serialize = "finish")]
    Finished,
}
