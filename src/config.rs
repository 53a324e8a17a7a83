//! Kernel construction configuration, built the way the teacher's
//! `deprecated::EventLoopBuilder`/`Config` are: a plain struct with setters
//! returning `&mut Self`, a `Default` impl, consumed once at construction.

/// Configuration consumed by [`crate::kernel::Kernel::new`].
#[derive(Debug, Clone)]
pub struct KernelConfig {
    component_name: String,
    component_priority: u32,
    /// Hint only: unlike the teacher's `notify_capacity`, the kernel never
    /// rejects a submission (spec §4.1 "no cancellation; every accepted
    /// message is eventually dispatched"). Consumed solely for logging.
    queue_capacity_hint: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            component_name: String::new(),
            component_priority: 0,
            queue_capacity_hint: 4_096,
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.component_name = name.into();
        self
    }

    pub fn component_priority(&mut self, priority: u32) -> &mut Self {
        self.component_priority = priority;
        self
    }

    pub fn queue_capacity_hint(&mut self, hint: usize) -> &mut Self {
        self.queue_capacity_hint = hint;
        self
    }

    pub fn get_component_name(&self) -> &str {
        &self.component_name
    }

    pub fn get_component_priority(&self) -> u32 {
        self.component_priority
    }

    pub fn get_queue_capacity_hint(&self) -> usize {
        self.queue_capacity_hint
    }
}
