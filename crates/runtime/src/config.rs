//! Runtime configuration, builder-style like the teacher's `CompilerConfig`.

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Terminal height used to truncate Dataframe `repr`/`print` output
    /// (`spec.md` §6).
    pub console_height: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { console_height: 25 }
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_console_height(mut self, height: usize) -> Self {
        self.console_height = height;
        self
    }
}
