pub mod midi_module;
pub mod module_manager;
pub mod osc_module;
pub mod traits;

// Re-export for convenience
pub use midi_module::MidiModule;
pub use module_manager::ModuleManager;
pub use osc_module::OscModule;
pub use traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
