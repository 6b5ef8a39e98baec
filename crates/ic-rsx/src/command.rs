//! RSX command representation

/// One decoded FIFO entry: a 16-bit method, its data-word count, and the
/// data words themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RsxCommand {
    /// Method number (which GPU operation)
    pub method: u16,
    /// Number of data words that followed the header
    pub count: u32,
    /// Command data
    pub data: Vec<u32>,
}

impl RsxCommand {
    /// First data word, or zero for a dataless command
    pub fn arg0(&self) -> u32 {
        self.data.first().copied().unwrap_or(0)
    }
}
